//! Trait merging.
//!
//! Traits apply in declaration order and the base object is applied last,
//! so a later trait overrides an earlier one and the base overrides all of
//! them. Only non-empty values overwrite. `bindings` merge per protocol key
//! with the same precedence.

use std::sync::Arc;

use asyncref_tree::{Mapping, Node, NodePath};
use serde::Serialize;

use crate::diagnostics::{Code, Diagnostics};
use crate::model::{Action, MessageTrait, OperationTrait};
use crate::resolved::{
    ResolvedChannel, ResolvedDocument, ResolvedMessage, ResolvedOperation, ResolvedReply, Slot,
};

/// An operation with its traits applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveOperation {
    pub path: NodePath,
    /// The operation before merging.
    pub base: Arc<ResolvedOperation>,
    pub action: Option<Action>,
    pub channel: Option<Slot<ResolvedChannel>>,
    pub messages: Vec<Slot<ResolvedMessage>>,
    pub reply: Option<Slot<ResolvedReply>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Mapping,
}

/// A message with its traits applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveMessage {
    pub path: NodePath,
    /// The message before merging.
    pub base: Arc<ResolvedMessage>,
    pub headers: Node,
    pub payload: Node,
    pub correlation_id: Node,
    pub content_type: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Mapping,
    pub examples: Node,
}

/// Effective objects for every distinct definition in a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effective {
    pub operations: Vec<EffectiveOperation>,
    pub messages: Vec<EffectiveMessage>,
}

impl Effective {
    pub fn operation(&self, path: &NodePath) -> Option<&EffectiveOperation> {
        self.operations.iter().find(|op| &op.path == path)
    }

    pub fn message(&self, path: &NodePath) -> Option<&EffectiveMessage> {
        self.messages.iter().find(|m| &m.path == path)
    }
}

/// Overwrite `acc` with `value` when `value` is set and not blank.
fn text(acc: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
        *acc = Some(v.clone());
    }
}

fn tree(acc: &mut Node, value: &Node) {
    if !value.is_empty() {
        *acc = value.clone();
    }
}

fn bindings(acc: &mut Mapping, value: &Node) {
    let Some(entries) = value.as_mapping() else {
        return;
    };
    for (protocol, binding) in entries.iter() {
        if !binding.is_empty() {
            acc.insert(protocol, binding.clone());
        }
    }
}

/// Report a trait that declares identity fields. Returns `true` if the
/// trait may be applied.
fn check_identity(
    owner: &str,
    site: &NodePath,
    fields: &[String],
    diagnostics: &mut Diagnostics,
) -> bool {
    if fields.is_empty() {
        return true;
    }
    diagnostics.fatal(
        Code::InvalidTraitField,
        site,
        format!(
            "{} trait declares '{}', which only the {} itself may set; trait skipped",
            owner,
            fields.join("', '"),
            owner
        ),
    );
    false
}

/// Apply an operation's traits.
pub fn merge_operation(op: &Arc<ResolvedOperation>) -> (EffectiveOperation, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut out = EffectiveOperation {
        path: op.path.clone(),
        base: Arc::clone(op),
        action: op.action,
        channel: op.channel.clone(),
        messages: op.messages.clone(),
        reply: op.reply.clone(),
        title: None,
        summary: None,
        description: None,
        security: Node::Null,
        tags: Node::Null,
        external_docs: Node::Null,
        bindings: Mapping::new(),
    };

    let traits = op.path.key("traits");
    for (i, slot) in op.traits.iter().enumerate() {
        let Some(t) = slot.value() else {
            continue;
        };
        if !check_identity("operation", &traits.index(i), &t.identity_fields, &mut diagnostics) {
            continue;
        }
        apply_operation_trait(&mut out, t);
    }

    text(&mut out.title, &op.title);
    text(&mut out.summary, &op.summary);
    text(&mut out.description, &op.description);
    tree(&mut out.security, &op.security);
    tree(&mut out.tags, &op.tags);
    tree(&mut out.external_docs, &op.external_docs);
    bindings(&mut out.bindings, &op.bindings);

    (out, diagnostics)
}

fn apply_operation_trait(out: &mut EffectiveOperation, t: &OperationTrait) {
    text(&mut out.title, &t.title);
    text(&mut out.summary, &t.summary);
    text(&mut out.description, &t.description);
    tree(&mut out.security, &t.security);
    tree(&mut out.tags, &t.tags);
    tree(&mut out.external_docs, &t.external_docs);
    bindings(&mut out.bindings, &t.bindings);
}

/// Apply a message's traits.
pub fn merge_message(message: &Arc<ResolvedMessage>) -> (EffectiveMessage, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut out = EffectiveMessage {
        path: message.path.clone(),
        base: Arc::clone(message),
        headers: Node::Null,
        payload: Node::Null,
        correlation_id: Node::Null,
        content_type: None,
        name: None,
        title: None,
        summary: None,
        description: None,
        tags: Node::Null,
        external_docs: Node::Null,
        bindings: Mapping::new(),
        examples: Node::Null,
    };

    let traits = message.path.key("traits");
    for (i, slot) in message.traits.iter().enumerate() {
        let Some(t) = slot.value() else {
            continue;
        };
        if !check_identity("message", &traits.index(i), &t.identity_fields, &mut diagnostics) {
            continue;
        }
        apply_message_trait(&mut out, t);
    }

    let m = message.as_ref();
    tree(&mut out.headers, &m.headers);
    tree(&mut out.payload, &m.payload);
    tree(&mut out.correlation_id, &m.correlation_id);
    text(&mut out.content_type, &m.content_type);
    text(&mut out.name, &m.name);
    text(&mut out.title, &m.title);
    text(&mut out.summary, &m.summary);
    text(&mut out.description, &m.description);
    tree(&mut out.tags, &m.tags);
    tree(&mut out.external_docs, &m.external_docs);
    bindings(&mut out.bindings, &m.bindings);
    tree(&mut out.examples, &m.examples);

    (out, diagnostics)
}

fn apply_message_trait(out: &mut EffectiveMessage, t: &MessageTrait) {
    tree(&mut out.headers, &t.headers);
    tree(&mut out.payload, &t.payload);
    tree(&mut out.correlation_id, &t.correlation_id);
    text(&mut out.content_type, &t.content_type);
    text(&mut out.name, &t.name);
    text(&mut out.title, &t.title);
    text(&mut out.summary, &t.summary);
    text(&mut out.description, &t.description);
    tree(&mut out.tags, &t.tags);
    tree(&mut out.external_docs, &t.external_docs);
    bindings(&mut out.bindings, &t.bindings);
    tree(&mut out.examples, &t.examples);
}

/// Merge every distinct operation and message of a resolved document.
///
/// Messages without a content type after merging inherit the document's
/// `defaultContentType`.
pub fn merge_all(doc: &ResolvedDocument) -> (Effective, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut effective = Effective::default();

    for op in doc.distinct_operations() {
        let (merged, diags) = merge_operation(&op);
        diagnostics.extend(diags);
        effective.operations.push(merged);
    }

    for message in doc.distinct_messages() {
        let (mut merged, diags) = merge_message(&message);
        diagnostics.extend(diags);
        if merged.content_type.is_none() {
            merged.content_type = doc.default_content_type.clone();
        }
        effective.messages.push(merged);
    }

    tracing::debug!(
        operations = effective.operations.len(),
        messages = effective.messages.len(),
        diagnostics = diagnostics.len(),
        "traits merged"
    );

    (effective, diagnostics)
}

impl Serialize for EffectiveOperation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("path", &self.path)?;
        if let Some(action) = &self.action {
            map.serialize_entry("action", action)?;
        }
        if let Some(channel) = self.channel.as_ref().and_then(Slot::value) {
            map.serialize_entry("channel", &channel.path)?;
        }
        let messages: Vec<&NodePath> = self
            .messages
            .iter()
            .filter_map(Slot::value)
            .map(|m| &m.path)
            .collect();
        map.serialize_entry("messages", &messages)?;
        for (key, value) in [
            ("title", &self.title),
            ("summary", &self.summary),
            ("description", &self.description),
        ] {
            if let Some(value) = value {
                map.serialize_entry(key, value)?;
            }
        }
        for (key, value) in [
            ("security", &self.security),
            ("tags", &self.tags),
            ("externalDocs", &self.external_docs),
        ] {
            if !value.is_empty() {
                map.serialize_entry(key, value)?;
            }
        }
        if !self.bindings.is_empty() {
            map.serialize_entry("bindings", &self.bindings)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::resolver::resolve;

    fn merged(yaml: &str) -> (ResolvedDocument, Effective, Diagnostics) {
        let doc = Document::from_yaml_str(yaml).unwrap();
        let (graph, diags) = resolve(&doc);
        assert!(diags.is_empty(), "{}", diags);
        let (effective, diags) = merge_all(&graph);
        (graph, effective, diags)
    }

    fn op_path(name: &str) -> NodePath {
        NodePath::root().key("operations").key(name)
    }

    const TRAITS: &str = r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
operations:
  unset:
    action: send
    channel:
      $ref: "#/channels/events"
    traits:
      - $ref: "#/components/operationTraits/T1"
      - $ref: "#/components/operationTraits/T2"
  own:
    action: send
    title: c
    channel:
      $ref: "#/channels/events"
    traits:
      - $ref: "#/components/operationTraits/T1"
      - $ref: "#/components/operationTraits/T2"
components:
  operationTraits:
    T1:
      title: a
      summary: from T1
    T2:
      title: b
"##;

    #[test]
    fn later_trait_wins_when_base_is_unset() {
        let (_, effective, diags) = merged(TRAITS);
        assert!(diags.is_empty(), "{}", diags);
        let op = effective.operation(&op_path("unset")).unwrap();
        assert_eq!(op.title.as_deref(), Some("b"));
        assert_eq!(op.summary.as_deref(), Some("from T1"));
    }

    #[test]
    fn base_wins_over_traits() {
        let (_, effective, _) = merged(TRAITS);
        let op = effective.operation(&op_path("own")).unwrap();
        assert_eq!(op.title.as_deref(), Some("c"));
        assert_eq!(op.base.title.as_deref(), Some("c"));
    }

    #[test]
    fn empty_base_value_does_not_overwrite() {
        let (_, effective, _) = merged(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
operations:
  blank:
    action: send
    title: ""
    channel:
      $ref: "#/channels/events"
    traits:
      - title: from trait
"##,
        );
        let op = effective.operation(&op_path("blank")).unwrap();
        assert_eq!(op.title.as_deref(), Some("from trait"));
    }

    #[test]
    fn bindings_merge_per_protocol() {
        let (_, effective, _) = merged(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
operations:
  publish:
    action: send
    channel:
      $ref: "#/channels/events"
    bindings:
      kafka:
        clientId: base
    traits:
      - bindings:
          kafka:
            clientId: trait
          amqp:
            ack: true
"##,
        );
        let op = effective.operation(&op_path("publish")).unwrap();
        let keys: Vec<&str> = op.bindings.keys().collect();
        assert_eq!(keys, vec!["kafka", "amqp"]);
        let kafka = op.bindings.get("kafka").unwrap();
        assert_eq!(kafka.get("clientId").and_then(Node::as_str), Some("base"));
    }

    #[test]
    fn identity_fields_skip_the_trait() {
        let (_, effective, diags) = merged(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
operations:
  publish:
    action: send
    channel:
      $ref: "#/channels/events"
    traits:
      - title: kept
      - action: receive
        title: dropped
"##,
        );
        assert_eq!(diags.count(Code::InvalidTraitField), 1, "{}", diags);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.path.to_string(), "#/operations/publish/traits/1");
        assert!(diag.message.contains("'action'"));

        let op = effective.operation(&op_path("publish")).unwrap();
        assert_eq!(op.title.as_deref(), Some("kept"));
        assert_eq!(op.action, Some(Action::Send));
    }

    #[test]
    fn message_traits_and_default_content_type() {
        let (_, effective, diags) = merged(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
defaultContentType: application/json
channels:
  events:
    address: events
    messages:
      plain:
        payload:
          type: string
      avro:
        payload:
          type: string
        traits:
          - $ref: "#/components/messageTraits/avro"
components:
  messageTraits:
    avro:
      contentType: application/vnd.apache.avro
      headers:
        type: object
"##,
        );
        assert!(diags.is_empty(), "{}", diags);
        let messages = NodePath::root().key("channels").key("events").key("messages");

        let plain = effective.message(&messages.key("plain")).unwrap();
        assert_eq!(plain.content_type.as_deref(), Some("application/json"));

        let avro = effective.message(&messages.key("avro")).unwrap();
        assert_eq!(avro.content_type.as_deref(), Some("application/vnd.apache.avro"));
        assert!(!avro.headers.is_empty());
        assert_eq!(avro.payload.get("type").and_then(Node::as_str), Some("string"));
    }

    #[test]
    fn shared_definitions_merge_once() {
        let (_, effective, _) = merged(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
    messages:
      evt:
        $ref: "#/components/messages/Event"
operations:
  publish:
    action: send
    channel:
      $ref: "#/channels/events"
    messages:
      - $ref: "#/channels/events/messages/evt"
components:
  messages:
    Event:
      payload:
        type: string
"##,
        );
        assert_eq!(effective.messages.len(), 1);
        assert_eq!(
            effective.messages[0].path.to_string(),
            "#/components/messages/Event"
        );
    }

    #[test]
    fn serializes_definition_paths() {
        let (_, effective, _) = merged(TRAITS);
        let op = effective.operation(&op_path("unset")).unwrap();
        let json = serde_json::to_value(op).unwrap();
        assert_eq!(json["path"], "#/operations/unset");
        assert_eq!(json["action"], "send");
        assert_eq!(json["channel"], "#/channels/events");
        assert_eq!(json["title"], "b");
        assert!(json.get("bindings").is_none());
    }
}

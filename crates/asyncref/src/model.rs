//! Typed AsyncAPI 3.x objects as declared in the document, before resolution.
//!
//! Opaque fields (schemas, bindings, security requirements, tags, examples)
//! stay as [`Node`] trees; only the fields that take part in resolution,
//! merging and validation are typed.

use std::fmt;
use std::sync::Arc;

use asyncref_tree::{Mapping, Node, NodePath};
use serde::Serialize;

/// Where an object is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Root,
    Components,
}

impl Scope {
    pub fn of(path: &NodePath) -> Scope {
        match path.first_key() {
            Some("components") => Scope::Components,
            _ => Scope::Root,
        }
    }
}

/// Mapping of names to values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> OrderedMap<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for OrderedMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A `$ref` as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    /// The raw pointer string.
    pub reference: String,
    /// Where the `$ref` object sits.
    pub site: NodePath,
}

/// A reference-capable object: either a pointer or an inline definition.
///
/// Sibling fields next to `$ref` are ignored, so a node is never both.
#[derive(Debug, PartialEq)]
pub enum RefOr<T> {
    Pointer(Ref),
    Inline(Arc<T>),
}

impl<T> Clone for RefOr<T> {
    fn clone(&self) -> Self {
        match self {
            RefOr::Pointer(r) => RefOr::Pointer(r.clone()),
            RefOr::Inline(obj) => RefOr::Inline(Arc::clone(obj)),
        }
    }
}

impl<T: Located> RefOr<T> {
    pub fn path(&self) -> &NodePath {
        match self {
            RefOr::Pointer(r) => &r.site,
            RefOr::Inline(obj) => obj.path(),
        }
    }

    pub fn as_inline(&self) -> Option<&Arc<T>> {
        match self {
            RefOr::Inline(obj) => Some(obj),
            RefOr::Pointer(_) => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Ref> {
        match self {
            RefOr::Pointer(r) => Some(r),
            RefOr::Inline(_) => None,
        }
    }
}

/// Objects that know their own location.
pub trait Located {
    fn path(&self) -> &NodePath;

    fn scope(&self) -> Scope {
        Scope::of(self.path())
    }
}

/// The kinds of reference-capable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Server,
    ServerVariable,
    Channel,
    Message,
    MessageTrait,
    Parameter,
    Operation,
    OperationTrait,
    OperationReply,
    OperationReplyAddress,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Server => "server",
            ObjectKind::ServerVariable => "server variable",
            ObjectKind::Channel => "channel",
            ObjectKind::Message => "message",
            ObjectKind::MessageTrait => "message trait",
            ObjectKind::Parameter => "parameter",
            ObjectKind::Operation => "operation",
            ObjectKind::OperationTrait => "operation trait",
            ObjectKind::OperationReply => "operation reply",
            ObjectKind::OperationReplyAddress => "operation reply address",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Send,
    Receive,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "send" => Some(Action::Send),
            "receive" => Some(Action::Receive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Send => "send",
            Action::Receive => "receive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `info` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub terms_of_service: Option<String>,
    pub contact: Node,
    pub license: Node,
    pub tags: Node,
    pub external_docs: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub path: NodePath,
    pub host: Option<String>,
    pub protocol: Option<String>,
    pub protocol_version: Option<String>,
    pub pathname: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub variables: OrderedMap<RefOr<ServerVariable>>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerVariable {
    pub path: NodePath,
    pub enum_values: Vec<String>,
    pub default: Option<String>,
    pub description: Option<String>,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub path: NodePath,
    /// Address template; `None` means the address is unknown or dynamic.
    pub address: Option<String>,
    pub messages: OrderedMap<RefOr<Message>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Always pointers to server definitions.
    pub servers: Vec<RefOr<Server>>,
    pub parameters: OrderedMap<RefOr<Parameter>>,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub path: NodePath,
    pub enum_values: Vec<String>,
    pub default: Option<String>,
    pub description: Option<String>,
    pub examples: Vec<String>,
    /// Runtime expression such as `$message.payload#/user/id`.
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub path: NodePath,
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
    pub bindings: Node,
    pub examples: Node,
    pub traits: Vec<RefOr<MessageTrait>>,
}

/// Message fields factored out for reuse. Everything but `traits`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTrait {
    pub path: NodePath,
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
    pub bindings: Node,
    pub examples: Node,
    /// Identity fields found non-empty on the trait.
    pub identity_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub path: NodePath,
    pub action: Option<Action>,
    pub channel: Option<RefOr<Channel>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
    pub traits: Vec<RefOr<OperationTrait>>,
    pub messages: Vec<RefOr<Message>>,
    pub reply: Option<RefOr<OperationReply>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationTrait {
    pub path: NodePath,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
    /// Identity fields found non-empty on the trait.
    pub identity_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationReply {
    pub path: NodePath,
    pub address: Option<RefOr<OperationReplyAddress>>,
    pub channel: Option<RefOr<Channel>>,
    pub messages: Vec<RefOr<Message>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationReplyAddress {
    pub path: NodePath,
    pub description: Option<String>,
    /// Runtime expression such as `$message.header#/replyTo`.
    pub location: Option<String>,
}

/// Reusable definitions under `components`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Components {
    pub servers: OrderedMap<RefOr<Server>>,
    pub channels: OrderedMap<RefOr<Channel>>,
    pub operations: OrderedMap<RefOr<Operation>>,
    pub messages: OrderedMap<RefOr<Message>>,
    pub parameters: OrderedMap<RefOr<Parameter>>,
    pub replies: OrderedMap<RefOr<OperationReply>>,
    pub reply_addresses: OrderedMap<RefOr<OperationReplyAddress>>,
    pub server_variables: OrderedMap<RefOr<ServerVariable>>,
    pub operation_traits: OrderedMap<RefOr<OperationTrait>>,
    pub message_traits: OrderedMap<RefOr<MessageTrait>>,
    /// Opaque definitions (`schemas`, `securitySchemes`, `tags`, bindings, ...)
    /// keyed by their section name.
    pub opaque: OrderedMap<Mapping>,
}

macro_rules! located {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Located for $ty {
                fn path(&self) -> &NodePath {
                    &self.path
                }
            }
        )*
    };
}

located!(
    Server,
    ServerVariable,
    Channel,
    Parameter,
    Message,
    MessageTrait,
    Operation,
    OperationTrait,
    OperationReply,
    OperationReplyAddress,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_from_first_segment() {
        let root = NodePath::root().key("channels").key("a");
        let comp = NodePath::root().key("components").key("channels").key("a");
        assert_eq!(Scope::of(&root), Scope::Root);
        assert_eq!(Scope::of(&comp), Scope::Components);
        assert_eq!(Scope::of(&NodePath::root()), Scope::Root);
    }

    #[test]
    fn action_parse() {
        assert_eq!(Action::parse("send"), Some(Action::Send));
        assert_eq!(Action::parse("receive"), Some(Action::Receive));
        assert_eq!(Action::parse("SEND"), None);
        assert_eq!(Action::Receive.to_string(), "receive");
    }

    #[test]
    fn pointer_path_is_its_site() {
        let site = NodePath::root().key("operations").key("a").key("channel");
        let node: RefOr<Channel> = RefOr::Pointer(Ref {
            reference: "#/channels/a".into(),
            site: site.clone(),
        });
        assert_eq!(node.path(), &site);
        assert!(node.as_inline().is_none());
    }
}

//! Builds the typed [`Document`] from a parsed tree.
//!
//! Every reference-capable node is registered in a path index, so that `$ref`
//! targets can be looked up by structural path and checked for their kind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use asyncref_tree::{Mapping, Node, NodePath};

use crate::diagnostics::{Code, Diagnostics};
use crate::error::BuildError;
use crate::model::{
    Action, Channel, Components, Info, Message, MessageTrait, ObjectKind, Operation,
    OperationReply, OperationReplyAddress, OperationTrait, OrderedMap, Parameter, Ref, RefOr,
    Scope, Server, ServerVariable,
};

/// Fields that identify an operation and may not come from a trait.
const OPERATION_IDENTITY_FIELDS: &[&str] = &["action", "channel", "messages", "reply", "traits"];

/// Fields that identify a message and may not come from a trait.
const MESSAGE_IDENTITY_FIELDS: &[&str] = &["traits"];

/// `components` sections holding reference-capable objects.
const TYPED_COMPONENTS: &[&str] = &[
    "servers",
    "channels",
    "operations",
    "messages",
    "parameters",
    "replies",
    "replyAddresses",
    "serverVariables",
    "operationTraits",
    "messageTraits",
];

/// A reference-capable node registered at some path.
#[derive(Debug, Clone)]
pub enum Target {
    Server(RefOr<Server>),
    ServerVariable(RefOr<ServerVariable>),
    Channel(RefOr<Channel>),
    Message(RefOr<Message>),
    MessageTrait(RefOr<MessageTrait>),
    Parameter(RefOr<Parameter>),
    Operation(RefOr<Operation>),
    OperationTrait(RefOr<OperationTrait>),
    OperationReply(RefOr<OperationReply>),
    OperationReplyAddress(RefOr<OperationReplyAddress>),
}

impl Target {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Target::Server(_) => ObjectKind::Server,
            Target::ServerVariable(_) => ObjectKind::ServerVariable,
            Target::Channel(_) => ObjectKind::Channel,
            Target::Message(_) => ObjectKind::Message,
            Target::MessageTrait(_) => ObjectKind::MessageTrait,
            Target::Parameter(_) => ObjectKind::Parameter,
            Target::Operation(_) => ObjectKind::Operation,
            Target::OperationTrait(_) => ObjectKind::OperationTrait,
            Target::OperationReply(_) => ObjectKind::OperationReply,
            Target::OperationReplyAddress(_) => ObjectKind::OperationReplyAddress,
        }
    }

    /// The `$ref` when this node is a pointer.
    pub fn reference(&self) -> Option<&Ref> {
        match self {
            Target::Server(n) => n.as_pointer(),
            Target::ServerVariable(n) => n.as_pointer(),
            Target::Channel(n) => n.as_pointer(),
            Target::Message(n) => n.as_pointer(),
            Target::MessageTrait(n) => n.as_pointer(),
            Target::Parameter(n) => n.as_pointer(),
            Target::Operation(n) => n.as_pointer(),
            Target::OperationTrait(n) => n.as_pointer(),
            Target::OperationReply(n) => n.as_pointer(),
            Target::OperationReplyAddress(n) => n.as_pointer(),
        }
    }
}

/// An AsyncAPI document, typed and indexed. Immutable once built.
#[derive(Debug)]
pub struct Document {
    tree: Node,
    pub asyncapi: Option<String>,
    pub id: Option<String>,
    pub info: Info,
    pub default_content_type: Option<String>,
    pub servers: OrderedMap<RefOr<Server>>,
    pub channels: OrderedMap<RefOr<Channel>>,
    pub operations: OrderedMap<RefOr<Operation>>,
    pub components: Components,
    index: HashMap<NodePath, Target>,
    diagnostics: Diagnostics,
}

impl Document {
    /// Build a document from a parsed tree.
    ///
    /// Fails when the root is not a mapping or when any mapping repeats a
    /// key. Shape problems in individual fields do not fail the build; they
    /// are returned by [`Document::diagnostics`] and the field is dropped.
    pub fn build(tree: Node) -> Result<Self, BuildError> {
        let root = tree
            .as_mapping()
            .ok_or(BuildError::RootNotMapping(tree.kind_name()))?;

        let mut duplicates = Diagnostics::new();
        check_keys(&tree, &NodePath::root(), &mut duplicates);
        if !duplicates.is_empty() {
            return Err(BuildError::DuplicateKeys(duplicates));
        }

        let mut b = Builder::default();
        let path = NodePath::root();

        let asyncapi = b.string(root, &path, "asyncapi");
        match asyncapi.as_deref() {
            Some(v) if v.starts_with("3.") => {}
            Some(v) => b.invalid(
                &path.key("asyncapi"),
                format!("unsupported AsyncAPI version: {} (only 3.x supported)", v),
            ),
            None => b.invalid(&path, "missing 'asyncapi' version"),
        }

        let id = b.string(root, &path, "id");
        let info = match b.mapping_field(root, &path, "info") {
            Some(info) => b.info(info, &path.key("info")),
            None => {
                b.invalid(&path, "missing 'info' object");
                Info::default()
            }
        };
        let default_content_type = b.string(root, &path, "defaultContentType");
        let servers = b.map_of(root, &path, "servers", Builder::server, Target::Server);
        let channels = b.map_of(root, &path, "channels", Builder::channel, Target::Channel);
        let operations = b.map_of(root, &path, "operations", Builder::operation, Target::Operation);
        let components = match b.mapping_field(root, &path, "components") {
            Some(c) => b.components(c, &path.key("components")),
            None => Components::default(),
        };

        tracing::debug!(
            targets = b.index.len(),
            diagnostics = b.diagnostics.len(),
            "document built"
        );

        let Builder { index, diagnostics } = b;
        Ok(Self {
            tree,
            asyncapi,
            id,
            info,
            default_content_type,
            servers,
            channels,
            operations,
            components,
            index,
            diagnostics,
        })
    }

    /// Parse YAML (or JSON) text and build the document.
    pub fn from_yaml_str(input: &str) -> Result<Self, BuildError> {
        Self::build(asyncref_tree::from_yaml_str(input)?)
    }

    /// The tree the document was built from.
    pub fn tree(&self) -> &Node {
        &self.tree
    }

    /// Raw node at a structural path.
    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        self.tree.at(path)
    }

    /// Reference-capable node registered at a structural path.
    pub fn target(&self, path: &NodePath) -> Option<&Target> {
        self.index.get(path)
    }

    pub fn scope_of(&self, path: &NodePath) -> Scope {
        Scope::of(path)
    }

    /// Non-fatal shape problems found while building.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

fn check_keys(node: &Node, path: &NodePath, out: &mut Diagnostics) {
    match node {
        Node::Mapping(map) => {
            let mut seen = HashSet::new();
            for (key, value) in map.iter() {
                let child = path.key(key);
                if key.is_empty() {
                    out.fatal(Code::DuplicateKey, path, "mapping has an empty key");
                } else if !seen.insert(key) {
                    out.fatal(
                        Code::DuplicateKey,
                        &child,
                        format!("key '{}' is declared more than once", key),
                    );
                }
                check_keys(value, &child, out);
            }
        }
        Node::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                check_keys(item, &path.index(i), out);
            }
        }
        _ => {}
    }
}

fn node(map: &Mapping, key: &str) -> Node {
    map.get(key).cloned().unwrap_or_default()
}

fn identity_fields(map: &Mapping, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| map.get(f).is_some_and(|n| !n.is_empty()))
        .map(|f| f.to_string())
        .collect()
}

type Build<T> = fn(&mut Builder, &Mapping, &NodePath) -> T;

#[derive(Default)]
struct Builder {
    index: HashMap<NodePath, Target>,
    diagnostics: Diagnostics,
}

impl Builder {
    fn invalid(&mut self, path: &NodePath, message: impl Into<String>) {
        self.diagnostics.fatal(Code::InvalidField, path, message);
    }

    /// A scalar field as text. Numbers and booleans are accepted as written.
    fn string(&mut self, map: &Mapping, path: &NodePath, key: &str) -> Option<String> {
        match map.get(key)? {
            Node::String(s) => Some(s.clone()),
            Node::Number(n) => Some(n.to_string()),
            Node::Bool(b) => Some(b.to_string()),
            Node::Null => None,
            other => {
                self.invalid(
                    &path.key(key),
                    format!("expected a string, found {}", other.kind_name()),
                );
                None
            }
        }
    }

    fn strings(&mut self, map: &Mapping, path: &NodePath, key: &str) -> Vec<String> {
        let Some(items) = self.sequence_field(map, path, key) else {
            return Vec::new();
        };
        let field = path.key(key);
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Node::String(s) => Some(s.clone()),
                Node::Number(n) => Some(n.to_string()),
                Node::Bool(b) => Some(b.to_string()),
                other => {
                    self.invalid(
                        &field.index(i),
                        format!("expected a string, found {}", other.kind_name()),
                    );
                    None
                }
            })
            .collect()
    }

    fn mapping_field<'n>(
        &mut self,
        map: &'n Mapping,
        path: &NodePath,
        key: &str,
    ) -> Option<&'n Mapping> {
        match map.get(key)? {
            Node::Mapping(m) => Some(m),
            Node::Null => None,
            other => {
                self.invalid(
                    &path.key(key),
                    format!("expected a mapping, found {}", other.kind_name()),
                );
                None
            }
        }
    }

    fn sequence_field<'n>(
        &mut self,
        map: &'n Mapping,
        path: &NodePath,
        key: &str,
    ) -> Option<&'n [Node]> {
        match map.get(key)? {
            Node::Sequence(items) => Some(items),
            Node::Null => None,
            other => {
                self.invalid(
                    &path.key(key),
                    format!("expected a sequence, found {}", other.kind_name()),
                );
                None
            }
        }
    }

    /// Build a reference-capable node and register it in the index.
    fn ref_or<T>(
        &mut self,
        node: &Node,
        path: NodePath,
        build: Build<T>,
        wrap: fn(RefOr<T>) -> Target,
    ) -> Option<RefOr<T>> {
        let Some(map) = node.as_mapping() else {
            self.invalid(
                &path,
                format!("expected a mapping, found {}", node.kind_name()),
            );
            return None;
        };
        let item = match map.get("$ref") {
            Some(Node::String(reference)) => RefOr::Pointer(Ref {
                reference: reference.clone(),
                site: path.clone(),
            }),
            Some(other) => {
                self.invalid(
                    &path.key("$ref"),
                    format!("$ref must be a string, found {}", other.kind_name()),
                );
                return None;
            }
            None => RefOr::Inline(Arc::new(build(self, map, &path))),
        };
        self.index.insert(path, wrap(item.clone()));
        Some(item)
    }

    fn one<T>(
        &mut self,
        map: &Mapping,
        path: &NodePath,
        key: &str,
        build: Build<T>,
        wrap: fn(RefOr<T>) -> Target,
    ) -> Option<RefOr<T>> {
        match map.get(key)? {
            Node::Null => None,
            node => self.ref_or(node, path.key(key), build, wrap),
        }
    }

    fn map_of<T>(
        &mut self,
        map: &Mapping,
        path: &NodePath,
        key: &str,
        build: Build<T>,
        wrap: fn(RefOr<T>) -> Target,
    ) -> OrderedMap<RefOr<T>> {
        let Some(entries) = self.mapping_field(map, path, key) else {
            return OrderedMap::default();
        };
        let field = path.key(key);
        entries
            .iter()
            .filter_map(|(name, node)| {
                self.ref_or(node, field.key(name), build, wrap)
                    .map(|item| (name.to_string(), item))
            })
            .collect()
    }

    fn list_of<T>(
        &mut self,
        map: &Mapping,
        path: &NodePath,
        key: &str,
        build: Build<T>,
        wrap: fn(RefOr<T>) -> Target,
    ) -> Vec<RefOr<T>> {
        let Some(items) = self.sequence_field(map, path, key) else {
            return Vec::new();
        };
        let field = path.key(key);
        items
            .iter()
            .enumerate()
            .filter_map(|(i, node)| self.ref_or(node, field.index(i), build, wrap))
            .collect()
    }

    fn info(&mut self, map: &Mapping, path: &NodePath) -> Info {
        let title = self.string(map, path, "title");
        if title.is_none() {
            self.invalid(path, "missing 'info.title'");
        }
        Info {
            title,
            version: self.string(map, path, "version"),
            description: self.string(map, path, "description"),
            terms_of_service: self.string(map, path, "termsOfService"),
            contact: node(map, "contact"),
            license: node(map, "license"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
        }
    }

    fn server(&mut self, map: &Mapping, path: &NodePath) -> Server {
        Server {
            path: path.clone(),
            host: self.string(map, path, "host"),
            protocol: self.string(map, path, "protocol"),
            protocol_version: self.string(map, path, "protocolVersion"),
            pathname: self.string(map, path, "pathname"),
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            variables: self.map_of(
                map,
                path,
                "variables",
                Builder::server_variable,
                Target::ServerVariable,
            ),
            security: node(map, "security"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
        }
    }

    fn server_variable(&mut self, map: &Mapping, path: &NodePath) -> ServerVariable {
        ServerVariable {
            path: path.clone(),
            enum_values: self.strings(map, path, "enum"),
            default: self.string(map, path, "default"),
            description: self.string(map, path, "description"),
            examples: self.strings(map, path, "examples"),
        }
    }

    fn channel(&mut self, map: &Mapping, path: &NodePath) -> Channel {
        Channel {
            path: path.clone(),
            address: self.string(map, path, "address"),
            messages: self.map_of(map, path, "messages", Builder::message, Target::Message),
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            servers: self.list_of(map, path, "servers", Builder::server, Target::Server),
            parameters: self.map_of(
                map,
                path,
                "parameters",
                Builder::parameter,
                Target::Parameter,
            ),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
        }
    }

    fn parameter(&mut self, map: &Mapping, path: &NodePath) -> Parameter {
        Parameter {
            path: path.clone(),
            enum_values: self.strings(map, path, "enum"),
            default: self.string(map, path, "default"),
            description: self.string(map, path, "description"),
            examples: self.strings(map, path, "examples"),
            location: self.string(map, path, "location"),
        }
    }

    fn message(&mut self, map: &Mapping, path: &NodePath) -> Message {
        Message {
            path: path.clone(),
            headers: node(map, "headers"),
            payload: node(map, "payload"),
            correlation_id: node(map, "correlationId"),
            content_type: self.string(map, path, "contentType"),
            name: self.string(map, path, "name"),
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
            examples: node(map, "examples"),
            traits: self.list_of(
                map,
                path,
                "traits",
                Builder::message_trait,
                Target::MessageTrait,
            ),
        }
    }

    fn message_trait(&mut self, map: &Mapping, path: &NodePath) -> MessageTrait {
        MessageTrait {
            path: path.clone(),
            headers: node(map, "headers"),
            payload: node(map, "payload"),
            correlation_id: node(map, "correlationId"),
            content_type: self.string(map, path, "contentType"),
            name: self.string(map, path, "name"),
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
            examples: node(map, "examples"),
            identity_fields: identity_fields(map, MESSAGE_IDENTITY_FIELDS),
        }
    }

    fn operation(&mut self, map: &Mapping, path: &NodePath) -> Operation {
        let action = match map.get("action") {
            Some(Node::String(s)) => {
                let action = Action::parse(s);
                if action.is_none() {
                    self.invalid(
                        &path.key("action"),
                        format!("invalid action '{}' (must be 'send' or 'receive')", s),
                    );
                }
                action
            }
            Some(Node::Null) | None => {
                self.invalid(path, "operation is missing 'action'");
                None
            }
            Some(other) => {
                self.invalid(
                    &path.key("action"),
                    format!("expected a string, found {}", other.kind_name()),
                );
                None
            }
        };

        let channel = self.one(map, path, "channel", Builder::channel, Target::Channel);
        if channel.is_none() && matches!(map.get("channel"), None | Some(Node::Null)) {
            self.invalid(path, "operation is missing 'channel'");
        }

        Operation {
            path: path.clone(),
            action,
            channel,
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            security: node(map, "security"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
            traits: self.list_of(
                map,
                path,
                "traits",
                Builder::operation_trait,
                Target::OperationTrait,
            ),
            messages: self.list_of(map, path, "messages", Builder::message, Target::Message),
            reply: self.one(map, path, "reply", Builder::reply, Target::OperationReply),
        }
    }

    fn operation_trait(&mut self, map: &Mapping, path: &NodePath) -> OperationTrait {
        OperationTrait {
            path: path.clone(),
            title: self.string(map, path, "title"),
            summary: self.string(map, path, "summary"),
            description: self.string(map, path, "description"),
            security: node(map, "security"),
            tags: node(map, "tags"),
            external_docs: node(map, "externalDocs"),
            bindings: node(map, "bindings"),
            identity_fields: identity_fields(map, OPERATION_IDENTITY_FIELDS),
        }
    }

    fn reply(&mut self, map: &Mapping, path: &NodePath) -> OperationReply {
        OperationReply {
            path: path.clone(),
            address: self.one(
                map,
                path,
                "address",
                Builder::reply_address,
                Target::OperationReplyAddress,
            ),
            channel: self.one(map, path, "channel", Builder::channel, Target::Channel),
            messages: self.list_of(map, path, "messages", Builder::message, Target::Message),
        }
    }

    fn reply_address(&mut self, map: &Mapping, path: &NodePath) -> OperationReplyAddress {
        OperationReplyAddress {
            path: path.clone(),
            description: self.string(map, path, "description"),
            location: self.string(map, path, "location"),
        }
    }

    fn components(&mut self, map: &Mapping, path: &NodePath) -> Components {
        let mut opaque = Vec::new();
        for (key, value) in map.iter() {
            if TYPED_COMPONENTS.contains(&key) {
                continue;
            }
            match value {
                Node::Mapping(m) => opaque.push((key.to_string(), m.clone())),
                Node::Null => {}
                other => self.invalid(
                    &path.key(key),
                    format!("expected a mapping, found {}", other.kind_name()),
                ),
            }
        }

        Components {
            servers: self.map_of(map, path, "servers", Builder::server, Target::Server),
            channels: self.map_of(map, path, "channels", Builder::channel, Target::Channel),
            operations: self.map_of(
                map,
                path,
                "operations",
                Builder::operation,
                Target::Operation,
            ),
            messages: self.map_of(map, path, "messages", Builder::message, Target::Message),
            parameters: self.map_of(
                map,
                path,
                "parameters",
                Builder::parameter,
                Target::Parameter,
            ),
            replies: self.map_of(map, path, "replies", Builder::reply, Target::OperationReply),
            reply_addresses: self.map_of(
                map,
                path,
                "replyAddresses",
                Builder::reply_address,
                Target::OperationReplyAddress,
            ),
            server_variables: self.map_of(
                map,
                path,
                "serverVariables",
                Builder::server_variable,
                Target::ServerVariable,
            ),
            operation_traits: self.map_of(
                map,
                path,
                "operationTraits",
                Builder::operation_trait,
                Target::OperationTrait,
            ),
            message_traits: self.map_of(
                map,
                path,
                "messageTraits",
                Builder::message_trait,
                Target::MessageTrait,
            ),
            opaque: opaque.into_iter().collect(),
        }
    }
}

//! The dereferenced object graph produced by [`crate::resolve`].
//!
//! A [`Slot`] stands where the document had a reference-capable node: either
//! the concrete object (with the pointer it came through) or a marker saying
//! why it could not be resolved. Consumers never see a `$ref`.

use std::collections::HashSet;
use std::sync::Arc;

use asyncref_tree::{Mapping, Node, NodePath};

use crate::model::{
    Action, Info, Located, MessageTrait, OperationReplyAddress, OperationTrait, OrderedMap,
    Parameter, ServerVariable,
};

/// A successfully dereferenced object.
#[derive(Debug, PartialEq)]
pub struct Resolved<T> {
    pub value: Arc<T>,
    /// The `$ref` the object was reached through, if any.
    pub provenance: Option<String>,
}

impl<T> Clone for Resolved<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            provenance: self.provenance.clone(),
        }
    }
}

/// Why a slot could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The pointer names nothing in this document.
    Missing,
    /// The pointer targets another document.
    External,
    /// The pointer string is not a valid JSON pointer.
    Malformed,
    /// The target is an object of another kind.
    TypeMismatch,
    /// The target lives in a scope this site may not reference.
    ScopeViolation,
    /// The pointer chain loops.
    Cycle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
    pub reference: String,
    pub site: NodePath,
    pub reason: UnresolvedReason,
}

#[derive(Debug, PartialEq)]
pub enum Slot<T> {
    Resolved(Resolved<T>),
    Unresolved(Unresolved),
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Resolved(r) => Slot::Resolved(r.clone()),
            Slot::Unresolved(u) => Slot::Unresolved(u.clone()),
        }
    }
}

impl<T> Slot<T> {
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            Slot::Resolved(r) => Some(&r.value),
            Slot::Unresolved(_) => None,
        }
    }

    pub fn provenance(&self) -> Option<&str> {
        match self {
            Slot::Resolved(r) => r.provenance.as_deref(),
            Slot::Unresolved(_) => None,
        }
    }

    pub fn unresolved(&self) -> Option<&Unresolved> {
        match self {
            Slot::Resolved(_) => None,
            Slot::Unresolved(u) => Some(u),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Resolved(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedServer {
    pub path: NodePath,
    pub host: Option<String>,
    pub protocol: Option<String>,
    pub protocol_version: Option<String>,
    pub pathname: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub variables: OrderedMap<Slot<ServerVariable>>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub path: NodePath,
    pub address: Option<String>,
    pub messages: OrderedMap<Slot<ResolvedMessage>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub servers: Vec<Slot<ResolvedServer>>,
    pub parameters: OrderedMap<Slot<Parameter>>,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
}

impl ResolvedChannel {
    /// Definition paths of the channel's resolved messages.
    pub fn message_paths(&self) -> HashSet<&NodePath> {
        self.messages
            .values()
            .filter_map(Slot::value)
            .map(|m| &m.path)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
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
    pub traits: Vec<Slot<MessageTrait>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub path: NodePath,
    pub action: Option<Action>,
    pub channel: Option<Slot<ResolvedChannel>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub security: Node,
    pub tags: Node,
    pub external_docs: Node,
    pub bindings: Node,
    pub traits: Vec<Slot<OperationTrait>>,
    pub messages: Vec<Slot<ResolvedMessage>>,
    pub reply: Option<Slot<ResolvedReply>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReply {
    pub path: NodePath,
    pub address: Option<Slot<OperationReplyAddress>>,
    pub channel: Option<Slot<ResolvedChannel>>,
    pub messages: Vec<Slot<ResolvedMessage>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedComponents {
    pub servers: OrderedMap<Slot<ResolvedServer>>,
    pub channels: OrderedMap<Slot<ResolvedChannel>>,
    pub operations: OrderedMap<Slot<ResolvedOperation>>,
    pub messages: OrderedMap<Slot<ResolvedMessage>>,
    pub parameters: OrderedMap<Slot<Parameter>>,
    pub replies: OrderedMap<Slot<ResolvedReply>>,
    pub reply_addresses: OrderedMap<Slot<OperationReplyAddress>>,
    pub server_variables: OrderedMap<Slot<ServerVariable>>,
    pub operation_traits: OrderedMap<Slot<OperationTrait>>,
    pub message_traits: OrderedMap<Slot<MessageTrait>>,
    pub opaque: OrderedMap<Mapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedDocument {
    pub asyncapi: Option<String>,
    pub id: Option<String>,
    pub info: Info,
    pub default_content_type: Option<String>,
    pub servers: OrderedMap<Slot<ResolvedServer>>,
    pub channels: OrderedMap<Slot<ResolvedChannel>>,
    pub operations: OrderedMap<Slot<ResolvedOperation>>,
    pub components: ResolvedComponents,
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
    ResolvedServer,
    ResolvedChannel,
    ResolvedMessage,
    ResolvedOperation,
    ResolvedReply,
);

/// Collects each definition once, keyed by its path.
struct Distinct<T> {
    seen: HashSet<NodePath>,
    items: Vec<Arc<T>>,
}

impl<T: Located> Distinct<T> {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn add(&mut self, slot: &Slot<T>) {
        if let Some(value) = slot.value() {
            if self.seen.insert(value.path().clone()) {
                self.items.push(Arc::clone(value));
            }
        }
    }
}

impl ResolvedDocument {
    /// Every resolved operation definition, root first.
    pub fn distinct_operations(&self) -> Vec<Arc<ResolvedOperation>> {
        let mut out = Distinct::new();
        self.operations
            .values()
            .chain(self.components.operations.values())
            .for_each(|s| out.add(s));
        out.items
    }

    /// Every resolved channel definition, including inline operation and
    /// reply channels.
    pub fn distinct_channels(&self) -> Vec<Arc<ResolvedChannel>> {
        let mut out = Distinct::new();
        self.channels
            .values()
            .chain(self.components.channels.values())
            .for_each(|s| out.add(s));
        for op in self.distinct_operations() {
            if let Some(channel) = &op.channel {
                out.add(channel);
            }
            if let Some(reply) = op.reply.as_ref().and_then(Slot::value) {
                if let Some(channel) = &reply.channel {
                    out.add(channel);
                }
            }
        }
        for reply in self.components.replies.values().filter_map(Slot::value) {
            if let Some(channel) = &reply.channel {
                out.add(channel);
            }
        }
        out.items
    }

    /// Every resolved message definition reachable from channels,
    /// operations, replies and `components.messages`.
    pub fn distinct_messages(&self) -> Vec<Arc<ResolvedMessage>> {
        let mut out = Distinct::new();
        for channel in self.distinct_channels() {
            channel.messages.values().for_each(|s| out.add(s));
        }
        for op in self.distinct_operations() {
            op.messages.iter().for_each(|s| out.add(s));
            if let Some(reply) = op.reply.as_ref().and_then(Slot::value) {
                reply.messages.iter().for_each(|s| out.add(s));
            }
        }
        self.components.messages.values().for_each(|s| out.add(s));
        out.items
    }

    /// Every resolved reply definition, from operations and `components.replies`.
    pub fn distinct_replies(&self) -> Vec<Arc<ResolvedReply>> {
        let mut out = Distinct::new();
        for op in self.distinct_operations() {
            if let Some(reply) = &op.reply {
                out.add(reply);
            }
        }
        self.components.replies.values().for_each(|s| out.add(s));
        out.items
    }

    /// Every resolved reply address definition.
    pub fn distinct_reply_addresses(&self) -> Vec<Arc<OperationReplyAddress>> {
        let mut out = Distinct::new();
        for reply in self.distinct_replies() {
            if let Some(address) = &reply.address {
                out.add(address);
            }
        }
        self.components
            .reply_addresses
            .values()
            .for_each(|s| out.add(s));
        out.items
    }

    /// Every resolved channel parameter definition.
    pub fn distinct_parameters(&self) -> Vec<Arc<Parameter>> {
        let mut out = Distinct::new();
        for channel in self.distinct_channels() {
            channel.parameters.values().for_each(|s| out.add(s));
        }
        self.components.parameters.values().for_each(|s| out.add(s));
        out.items
    }

    /// Every resolved server definition, including channel server lists.
    pub fn distinct_servers(&self) -> Vec<Arc<ResolvedServer>> {
        let mut out = Distinct::new();
        self.servers
            .values()
            .chain(self.components.servers.values())
            .for_each(|s| out.add(s));
        for channel in self.distinct_channels() {
            channel.servers.iter().for_each(|s| out.add(s));
        }
        out.items
    }
}

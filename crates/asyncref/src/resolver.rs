//! `$ref` resolution.
//!
//! Walks the document depth-first in declaration order. Every
//! reference-capable node is resolved once and memoized by its path, so
//! shared definitions end up as the same `Arc` and their problems are
//! reported once. The DFS stack doubles as the visited set for cycle
//! detection: a path that is re-entered while still on the stack closes a
//! cycle.

use std::collections::HashMap;
use std::sync::Arc;

use asyncref_tree::{parse_pointer, Node, NodePath, Pointer, Segment};

use crate::diagnostics::{Code, Diagnostics};
use crate::document::{Document, Target};
use crate::model::{
    Channel, Located, Message, MessageTrait, ObjectKind, Operation, OperationReply,
    OperationReplyAddress, OperationTrait, OrderedMap, Parameter, Ref, RefOr, Scope, Server,
    ServerVariable,
};
use crate::resolved::{
    Resolved, ResolvedChannel, ResolvedComponents, ResolvedDocument, ResolvedMessage,
    ResolvedOperation, ResolvedReply, ResolvedServer, Slot, Unresolved, UnresolvedReason,
};

/// Resolve every `$ref` in the document.
///
/// Failures are local: the affected slot becomes [`Slot::Unresolved`] and
/// the walk continues with its siblings. Each call owns its own state, so
/// concurrent calls on the same document do not interfere.
pub fn resolve(doc: &Document) -> (ResolvedDocument, Diagnostics) {
    let mut cx = Resolver {
        doc,
        stack: Vec::new(),
        memo: HashMap::new(),
        diagnostics: Diagnostics::new(),
    };

    let mut out = ResolvedDocument {
        asyncapi: doc.asyncapi.clone(),
        id: doc.id.clone(),
        info: doc.info.clone(),
        default_content_type: doc.default_content_type.clone(),
        ..Default::default()
    };

    for key in cx.declared_keys(&NodePath::root()) {
        match key {
            "servers" => out.servers = cx.map(&doc.servers),
            "channels" => out.channels = cx.map(&doc.channels),
            "operations" => out.operations = cx.map(&doc.operations),
            "components" => out.components = cx.components(doc),
            _ => {}
        }
    }

    tracing::debug!(
        definitions = cx.memo.len(),
        diagnostics = cx.diagnostics.len(),
        "references resolved"
    );

    (out, cx.diagnostics)
}

/// Memoized outcome for a path.
#[derive(Clone)]
enum Memo {
    Server(Slot<ResolvedServer>),
    ServerVariable(Slot<ServerVariable>),
    Channel(Slot<ResolvedChannel>),
    Message(Slot<ResolvedMessage>),
    MessageTrait(Slot<MessageTrait>),
    Parameter(Slot<Parameter>),
    Operation(Slot<ResolvedOperation>),
    OperationTrait(Slot<OperationTrait>),
    OperationReply(Slot<ResolvedReply>),
    OperationReplyAddress(Slot<OperationReplyAddress>),
    Unresolved(Unresolved),
}

struct Resolver<'a> {
    doc: &'a Document,
    stack: Vec<NodePath>,
    memo: HashMap<NodePath, Memo>,
    diagnostics: Diagnostics,
}

/// An object kind the resolver knows how to dereference.
trait Resolve: Located + Sized {
    type Output;
    const KIND: ObjectKind;

    fn from_target(target: &Target) -> Option<&RefOr<Self>>;
    fn resolve_inline(this: &Arc<Self>, cx: &mut Resolver<'_>) -> Arc<Self::Output>;
    fn into_memo(slot: Slot<Self::Output>) -> Memo;
    fn from_memo(memo: &Memo) -> Option<Slot<Self::Output>>;
}

macro_rules! resolvable {
    ($ty:ident => $out:ty, |$this:ident, $cx:ident| $body:expr) => {
        impl Resolve for $ty {
            type Output = $out;
            const KIND: ObjectKind = ObjectKind::$ty;

            fn from_target(target: &Target) -> Option<&RefOr<Self>> {
                match target {
                    Target::$ty(node) => Some(node),
                    _ => None,
                }
            }

            fn resolve_inline($this: &Arc<Self>, $cx: &mut Resolver<'_>) -> Arc<$out> {
                $body
            }

            fn into_memo(slot: Slot<$out>) -> Memo {
                match slot {
                    Slot::Unresolved(u) => Memo::Unresolved(u),
                    resolved => Memo::$ty(resolved),
                }
            }

            fn from_memo(memo: &Memo) -> Option<Slot<$out>> {
                match memo {
                    Memo::$ty(slot) => Some(slot.clone()),
                    Memo::Unresolved(u) => Some(Slot::Unresolved(u.clone())),
                    _ => None,
                }
            }
        }
    };
}

resolvable!(ServerVariable => ServerVariable, |this, _cx| Arc::clone(this));
resolvable!(Parameter => Parameter, |this, _cx| Arc::clone(this));
resolvable!(MessageTrait => MessageTrait, |this, _cx| Arc::clone(this));
resolvable!(OperationTrait => OperationTrait, |this, _cx| Arc::clone(this));
resolvable!(OperationReplyAddress => OperationReplyAddress, |this, _cx| Arc::clone(this));

resolvable!(Server => ResolvedServer, |this, cx| Arc::new(ResolvedServer {
    path: this.path.clone(),
    host: this.host.clone(),
    protocol: this.protocol.clone(),
    protocol_version: this.protocol_version.clone(),
    pathname: this.pathname.clone(),
    title: this.title.clone(),
    summary: this.summary.clone(),
    description: this.description.clone(),
    variables: cx.map(&this.variables),
    security: this.security.clone(),
    tags: this.tags.clone(),
    external_docs: this.external_docs.clone(),
    bindings: this.bindings.clone(),
}));

resolvable!(Channel => ResolvedChannel, |this, cx| {
    let mut messages = OrderedMap::default();
    let mut servers = Vec::new();
    let mut parameters = OrderedMap::default();
    for key in cx.declared_keys(&this.path) {
        match key {
            "messages" => messages = cx.map(&this.messages),
            "servers" => servers = cx.list(&this.servers),
            "parameters" => parameters = cx.map(&this.parameters),
            _ => {}
        }
    }
    Arc::new(ResolvedChannel {
        path: this.path.clone(),
        address: this.address.clone(),
        messages,
        title: this.title.clone(),
        summary: this.summary.clone(),
        description: this.description.clone(),
        servers,
        parameters,
        tags: this.tags.clone(),
        external_docs: this.external_docs.clone(),
        bindings: this.bindings.clone(),
    })
});

resolvable!(Message => ResolvedMessage, |this, cx| Arc::new(ResolvedMessage {
    path: this.path.clone(),
    headers: this.headers.clone(),
    payload: this.payload.clone(),
    correlation_id: this.correlation_id.clone(),
    content_type: this.content_type.clone(),
    name: this.name.clone(),
    title: this.title.clone(),
    summary: this.summary.clone(),
    description: this.description.clone(),
    tags: this.tags.clone(),
    external_docs: this.external_docs.clone(),
    bindings: this.bindings.clone(),
    examples: this.examples.clone(),
    traits: cx.list(&this.traits),
}));

resolvable!(Operation => ResolvedOperation, |this, cx| {
    let mut channel = None;
    let mut traits = Vec::new();
    let mut messages = Vec::new();
    let mut reply = None;
    for key in cx.declared_keys(&this.path) {
        match key {
            "channel" => channel = this.channel.as_ref().map(|c| cx.slot(c)),
            "traits" => traits = cx.list(&this.traits),
            "messages" => messages = cx.list(&this.messages),
            "reply" => reply = this.reply.as_ref().map(|r| cx.slot(r)),
            _ => {}
        }
    }
    Arc::new(ResolvedOperation {
        path: this.path.clone(),
        action: this.action,
        channel,
        title: this.title.clone(),
        summary: this.summary.clone(),
        description: this.description.clone(),
        security: this.security.clone(),
        tags: this.tags.clone(),
        external_docs: this.external_docs.clone(),
        bindings: this.bindings.clone(),
        traits,
        messages,
        reply,
    })
});

resolvable!(OperationReply => ResolvedReply, |this, cx| {
    let mut address = None;
    let mut channel = None;
    let mut messages = Vec::new();
    for key in cx.declared_keys(&this.path) {
        match key {
            "address" => address = this.address.as_ref().map(|a| cx.slot(a)),
            "channel" => channel = this.channel.as_ref().map(|c| cx.slot(c)),
            "messages" => messages = cx.list(&this.messages),
            _ => {}
        }
    }
    Arc::new(ResolvedReply {
        path: this.path.clone(),
        address,
        channel,
        messages,
    })
});

impl<'a> Resolver<'a> {
    fn map<T: Resolve>(&mut self, map: &OrderedMap<RefOr<T>>) -> OrderedMap<Slot<T::Output>> {
        map.iter()
            .map(|(name, node)| (name.to_string(), self.slot(node)))
            .collect()
    }

    fn list<T: Resolve>(&mut self, items: &[RefOr<T>]) -> Vec<Slot<T::Output>> {
        items.iter().map(|node| self.slot(node)).collect()
    }

    /// Keys of the mapping at `path`, in declaration order.
    fn declared_keys(&self, path: &NodePath) -> Vec<&'a str> {
        self.doc
            .tree()
            .at(path)
            .and_then(Node::as_mapping)
            .map(|m| m.keys().collect())
            .unwrap_or_default()
    }

    fn components(&mut self, doc: &Document) -> ResolvedComponents {
        let c = &doc.components;
        let mut out = ResolvedComponents {
            opaque: c.opaque.clone(),
            ..Default::default()
        };
        for key in self.declared_keys(&NodePath::root().key("components")) {
            match key {
                "servers" => out.servers = self.map(&c.servers),
                "channels" => out.channels = self.map(&c.channels),
                "operations" => out.operations = self.map(&c.operations),
                "messages" => out.messages = self.map(&c.messages),
                "parameters" => out.parameters = self.map(&c.parameters),
                "replies" => out.replies = self.map(&c.replies),
                "replyAddresses" => out.reply_addresses = self.map(&c.reply_addresses),
                "serverVariables" => out.server_variables = self.map(&c.server_variables),
                "operationTraits" => out.operation_traits = self.map(&c.operation_traits),
                "messageTraits" => out.message_traits = self.map(&c.message_traits),
                _ => {}
            }
        }
        out
    }

    /// Resolve the reference-capable node declared at `node.path()`.
    fn slot<T: Resolve>(&mut self, node: &RefOr<T>) -> Slot<T::Output> {
        let path = node.path().clone();
        if let Some(hit) = self.memo.get(&path).and_then(T::from_memo) {
            return hit;
        }
        if self.stack.contains(&path) {
            return Slot::Unresolved(self.cycle(&path));
        }

        self.stack.push(path.clone());
        let out = match node {
            RefOr::Inline(obj) => Slot::Resolved(Resolved {
                value: T::resolve_inline(obj, self),
                provenance: None,
            }),
            RefOr::Pointer(r) => self.follow::<T>(r),
        };
        self.stack.pop();

        // A cycle through this node has already recorded its outcome.
        self.memo
            .entry(path)
            .or_insert_with(|| T::into_memo(out.clone()));
        out
    }

    /// Dereference a `$ref` expected to point at a `T`.
    fn follow<T: Resolve>(&mut self, r: &Ref) -> Slot<T::Output> {
        let doc = self.doc;
        let segments = match parse_pointer(&r.reference) {
            Ok(Pointer::Local(segments)) => segments,
            Ok(Pointer::External { document, .. }) => {
                self.diagnostics.fatal(
                    Code::UnresolvedReference,
                    &r.site,
                    format!(
                        "'{}' points into external document '{}', which must be loaded and bundled before resolution",
                        r.reference, document
                    ),
                );
                return self.unresolved(r, UnresolvedReason::External);
            }
            Err(e) => {
                self.diagnostics.fatal(
                    Code::UnresolvedReference,
                    &r.site,
                    format!("malformed reference '{}': {}", r.reference, e),
                );
                return self.unresolved(r, UnresolvedReason::Malformed);
            }
        };

        let Some((target_path, raw)) = doc.tree().locate(&segments) else {
            self.diagnostics.fatal(
                Code::UnresolvedReference,
                &r.site,
                format!("{} '{}' does not exist", T::KIND, r.reference),
            );
            return self.unresolved(r, UnresolvedReason::Missing);
        };

        let found = match doc.target(&target_path) {
            Some(target) => match T::from_target(target) {
                Some(node) => Ok(node),
                None => Err(target.kind().to_string()),
            },
            None => Err(raw.kind_name().to_string()),
        };
        let node = match found {
            Ok(node) => node,
            Err(found) => {
                self.diagnostics.fatal(
                    Code::TypeMismatch,
                    &r.site,
                    format!(
                        "'{}' should point at a {}, found {}",
                        r.reference,
                        T::KIND,
                        found
                    ),
                );
                return self.unresolved(r, UnresolvedReason::TypeMismatch);
            }
        };

        if let Some(message) = self.scope_violation(T::KIND, &r.site, &target_path) {
            self.diagnostics
                .fatal(Code::ScopeViolation, &r.site, message);
            return self.unresolved(r, UnresolvedReason::ScopeViolation);
        }

        tracing::trace!(site = %r.site, target = %target_path, "following $ref");
        match self.slot(node) {
            Slot::Resolved(resolved) => Slot::Resolved(Resolved {
                value: resolved.value,
                provenance: Some(r.reference.clone()),
            }),
            Slot::Unresolved(u) => Slot::Unresolved(Unresolved {
                reference: r.reference.clone(),
                site: r.site.clone(),
                reason: u.reason,
            }),
        }
    }

    fn unresolved<O>(&self, r: &Ref, reason: UnresolvedReason) -> Slot<O> {
        Slot::Unresolved(Unresolved {
            reference: r.reference.clone(),
            site: r.site.clone(),
            reason,
        })
    }

    /// Report a cycle closing at `path` and mark every node on it.
    fn cycle(&mut self, path: &NodePath) -> Unresolved {
        let start = self.stack.iter().position(|p| p == path).unwrap_or(0);
        let chain: Vec<String> = self.stack[start..]
            .iter()
            .chain(std::iter::once(path))
            .map(NodePath::to_string)
            .collect();
        self.diagnostics.fatal(
            Code::CycleDetected,
            path,
            format!("reference cycle: {}", chain.join(" -> ")),
        );

        for member in &self.stack[start..] {
            let reference = self
                .doc
                .target(member)
                .and_then(Target::reference)
                .map(|r| r.reference.clone())
                .unwrap_or_default();
            self.memo.insert(
                member.clone(),
                Memo::Unresolved(Unresolved {
                    reference,
                    site: member.clone(),
                    reason: UnresolvedReason::Cycle,
                }),
            );
        }

        match self.memo.get(path) {
            Some(Memo::Unresolved(u)) => u.clone(),
            _ => Unresolved {
                reference: String::new(),
                site: path.clone(),
                reason: UnresolvedReason::Cycle,
            },
        }
    }

    /// Root-scoped channels may only list root servers, and root-scoped
    /// operations may only use root channels.
    fn scope_violation(
        &self,
        kind: ObjectKind,
        site: &NodePath,
        target: &NodePath,
    ) -> Option<String> {
        if Scope::of(site) != Scope::Root {
            return None;
        }
        let owner = site.parent()?;
        let owner_kind = |expected: ObjectKind| {
            self.doc
                .target(&owner)
                .is_some_and(|t| t.kind() == expected)
        };

        match (kind, site.last()) {
            (ObjectKind::Server, Some(Segment::Index(_))) => {
                let channel = owner.parent()?;
                let is_channel_servers = owner.last() == Some(&Segment::Key("servers".into()))
                    && self
                        .doc
                        .target(&channel)
                        .is_some_and(|t| t.kind() == ObjectKind::Channel);
                let is_root_server =
                    target.first_key() == Some("servers") && target.segments().len() == 2;
                (is_channel_servers && !is_root_server).then(|| {
                    format!(
                        "channel {} is declared at the root and may only reference servers under #/servers, not {}",
                        channel, target
                    )
                })
            }
            (ObjectKind::Channel, Some(Segment::Key(key))) if key == "channel" => {
                let is_root_channel =
                    target.first_key() == Some("channels") && target.segments().len() == 2;
                (owner_kind(ObjectKind::Operation) && !is_root_channel).then(|| {
                    format!(
                        "operation {} is declared at the root and may only reference channels under #/channels, not {}",
                        owner, target
                    )
                })
            }
            _ => None,
        }
    }
}

//! Reference resolution, trait merging and constraint validation for
//! AsyncAPI 3.x documents.
//!
//! Takes a parsed document tree, dereferences every `$ref`, applies
//! operation and message traits, and checks the structural rules that
//! span objects (scopes, containment, address parameters). Problems are
//! collected as [`Diagnostics`] rather than stopping at the first one.

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod model;
pub mod resolved;
pub mod resolver;
pub mod traits;
pub mod validator;

pub use config::{EngineConfig, LintLevel};
pub use diagnostics::{Code, Diagnostic, Diagnostics, Severity};
pub use document::{Document, Target};
pub use engine::{process, process_path, process_str, Output};
pub use error::{BuildError, ConfigError};
pub use model::{
    Action, Channel, Components, Info, Located, Message, MessageTrait, ObjectKind, Operation,
    OperationReply, OperationReplyAddress, OperationTrait, OrderedMap, Parameter, Ref, RefOr,
    Scope, Server, ServerVariable,
};
pub use resolved::{
    Resolved, ResolvedChannel, ResolvedComponents, ResolvedDocument, ResolvedMessage,
    ResolvedOperation, ResolvedReply, ResolvedServer, Slot, Unresolved, UnresolvedReason,
};
pub use resolver::resolve;
pub use traits::{
    merge_all, merge_message, merge_operation, Effective, EffectiveMessage, EffectiveOperation,
};
pub use validator::validate;

// Re-export the tree types callers need to build input.
pub use asyncref_tree::{Mapping, Node, NodePath};

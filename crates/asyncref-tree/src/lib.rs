//! Ordered document tree for AsyncAPI documents.
//!
//! The front end turns YAML/JSON text into a [`Node`] tree that keeps mapping
//! entries in declaration order, duplicates included, so that the document
//! model can report them. [`NodePath`] addresses nodes structurally and
//! [`parse_pointer`] reads `$ref` strings.

pub mod error;
pub mod node;
pub mod path;
pub mod source;

pub use error::{LoadError, PointerError};
pub use node::{Mapping, Node};
pub use path::{parse_pointer, NodePath, Pointer, Segment};
pub use source::{from_json_str, from_path, from_yaml_str};

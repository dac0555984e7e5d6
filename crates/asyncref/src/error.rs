use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// Errors that prevent a [`crate::Document`] from being built at all.
#[derive(Debug, Error)]
pub enum BuildError {
    /// E2000: The document root is not a mapping.
    #[error("E2000: document root must be a mapping, found {0}")]
    RootNotMapping(&'static str),

    /// E2001: One or more mappings repeat a key. Every occurrence is reported.
    #[error("E2001: document has {} duplicate or empty mapping key(s)", .0.len())]
    DuplicateKeys(Diagnostics),

    /// Loading the source text failed.
    #[error(transparent)]
    Load(#[from] asyncref_tree::LoadError),
}

/// Errors produced while loading an [`crate::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

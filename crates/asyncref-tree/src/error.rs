use thiserror::Error;

/// Errors produced while loading a document into a [`crate::Node`] tree.
#[derive(Debug, Error)]
pub enum LoadError {
    /// E1002: YAML parse error.
    #[error("E1002: YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// E1002: JSON parse error.
    #[error("E1002: JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// E1003: the file extension names no supported format.
    #[error("E1003: unsupported document extension '{0}' (expected .yaml, .yml or .json)")]
    UnsupportedExtension(String),

    /// I/O error reading the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while parsing a `$ref` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("empty reference")]
    Empty,

    /// The fragment after `#` must be empty or start with `/`.
    #[error("fragment '{0}' must start with '/'")]
    Malformed(String),

    /// `~` must be followed by `0` or `1`.
    #[error("invalid escape in segment '{0}'")]
    InvalidEscape(String),
}

//! Structured diagnostics collected by every phase.

use std::fmt;

use asyncref_tree::NodePath;
use serde::Serialize;

/// Diagnostic codes (E2001–E2306).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// E2001: A mapping repeats a key, or has an empty key.
    DuplicateKey,
    /// E2002: A field has the wrong shape (e.g. `action: jump`).
    InvalidField,
    /// E2101: A `$ref` target does not exist or cannot be loaded.
    UnresolvedReference,
    /// E2102: A `$ref` points at an object of another kind.
    TypeMismatch,
    /// E2103: A `$ref` chain leads back to itself.
    CycleDetected,
    /// E2104: A root-scoped object references a components-scoped one where only root is allowed.
    ScopeViolation,
    /// E2201: A trait declares a field that identifies its base object.
    InvalidTraitField,
    /// E2301: A message list is not a subset of its channel's messages.
    ContainmentViolation,
    /// E2302: An address `{token}` has no parameter.
    MissingParameterDefinition,
    /// E2303: A parameter matches no address token.
    UnusedParameter,
    /// E2304: Both the reply and its channel declare an address.
    AmbiguousReplyAddress,
    /// E2305: A runtime expression is not well formed.
    InvalidRuntimeExpression,
    /// E2306: A server `{variable}` has no variable definition.
    UndefinedServerVariable,
}

impl Code {
    pub fn id(&self) -> &'static str {
        match self {
            Code::DuplicateKey => "E2001",
            Code::InvalidField => "E2002",
            Code::UnresolvedReference => "E2101",
            Code::TypeMismatch => "E2102",
            Code::CycleDetected => "E2103",
            Code::ScopeViolation => "E2104",
            Code::InvalidTraitField => "E2201",
            Code::ContainmentViolation => "E2301",
            Code::MissingParameterDefinition => "E2302",
            Code::UnusedParameter => "E2303",
            Code::AmbiguousReplyAddress => "E2304",
            Code::InvalidRuntimeExpression => "E2305",
            Code::UndefinedServerVariable => "E2306",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
}

/// A single problem found while building, resolving, merging or validating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: Code,
    pub severity: Severity,
    /// Location of the offending node.
    pub path: NodePath,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Fatal => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} {} at {}: {}", self.code, level, self.path, self.message)
    }
}

/// Ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn fatal(&mut self, code: Code, path: &NodePath, message: impl Into<String>) {
        self.push(Diagnostic {
            code,
            severity: Severity::Fatal,
            path: path.clone(),
            message: message.into(),
        });
    }

    pub fn warning(&mut self, code: Code, path: &NodePath, message: impl Into<String>) {
        self.push(Diagnostic {
            code,
            severity: Severity::Warning,
            path: path.clone(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn with_code(&self, code: Code) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.code == code)
    }

    pub fn count(&self, code: Code) -> usize {
        self.with_code(code).count()
    }

    /// Turn every warning into a fatal diagnostic.
    pub fn escalate_warnings(&mut self) {
        for diagnostic in &mut self.0 {
            diagnostic.severity = Severity::Fatal;
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.0 {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

//! Engine configuration (`asyncref.yaml`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a lint-style diagnostic is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintLevel {
    /// Not reported.
    Allow,
    /// Reported as a warning.
    #[default]
    Warn,
    /// Reported as a fatal diagnostic.
    Deny,
}

/// Knobs for the resolve/merge/validate pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Channel parameters that no address token uses.
    #[serde(default)]
    pub unused_parameters: LintLevel,

    /// Check the syntax of `location` runtime expressions.
    #[serde(default = "default_true")]
    pub runtime_expressions: bool,

    /// Report every warning as fatal.
    #[serde(default)]
    pub deny_warnings: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unused_parameters: LintLevel::Warn,
            runtime_expressions: true,
            deny_warnings: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unused_parameters(mut self, level: LintLevel) -> Self {
        self.unused_parameters = level;
        self
    }

    pub fn with_deny_warnings(mut self, deny: bool) -> Self {
        self.deny_warnings = deny;
        self
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.unused_parameters, LintLevel::Warn);
        assert!(config.runtime_expressions);
        assert!(!config.deny_warnings);
    }

    #[test]
    fn parse_levels() {
        let config = EngineConfig::from_yaml_str(
            r#"
unused_parameters: deny
runtime_expressions: false
"#,
        )
        .unwrap();
        assert_eq!(config.unused_parameters, LintLevel::Deny);
        assert!(!config.runtime_expressions);
    }

    #[test]
    fn reject_unknown_keys() {
        let result = EngineConfig::from_yaml_str("unused_params: allow");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "deny_warnings: true").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert!(config.deny_warnings);
    }
}

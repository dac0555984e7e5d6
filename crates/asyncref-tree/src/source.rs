//! Loading YAML/JSON text into a [`Node`] tree.
//!
//! Both loaders keep mapping entries in declaration order and keep duplicate
//! keys, so the document model decides how to report them.

use std::path::Path;

use crate::error::LoadError;
use crate::node::Node;

/// Parse a YAML document (JSON is accepted too, being valid YAML).
pub fn from_yaml_str(input: &str) -> Result<Node, LoadError> {
    Ok(serde_yaml::from_str(input)?)
}

/// Parse a JSON document.
pub fn from_json_str(input: &str) -> Result<Node, LoadError> {
    Ok(serde_json::from_str(input)?)
}

/// Load a document from disk, picking the parser by extension.
///
/// `.json` uses the JSON parser, `.yaml` and `.yml` the YAML one.
pub fn from_path(path: &Path) -> Result<Node, LoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let parse: fn(&str) -> Result<Node, LoadError> = match extension.as_str() {
        "json" => from_json_str,
        "yaml" | "yml" => from_yaml_str,
        _ => return Err(LoadError::UnsupportedExtension(extension)),
    };
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_yaml_document() {
        let node = from_yaml_str(
            r#"
asyncapi: "3.0.0"
info:
  title: Test
  version: "1.0.0"
"#,
        )
        .unwrap();
        assert_eq!(node.get("asyncapi").and_then(Node::as_str), Some("3.0.0"));
        assert_eq!(
            node.get("info").and_then(|i| i.get("title")).and_then(Node::as_str),
            Some("Test")
        );
    }

    #[test]
    fn yaml_syntax_error() {
        let err = from_yaml_str("info: [unclosed").unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)));
        assert!(err.to_string().starts_with("E1002"));
    }

    #[test]
    fn load_json_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"asyncapi": "3.0.0", "channels": {{}}}}"#).unwrap();
        let node = from_path(file.path()).unwrap();
        assert!(node.get("channels").unwrap().as_mapping().unwrap().is_empty());
    }

    #[test]
    fn load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "asyncapi: 3.0.0").unwrap();
        let node = from_path(file.path()).unwrap();
        assert_eq!(node.get("asyncapi").and_then(Node::as_str), Some("3.0.0"));
    }

    #[test]
    fn non_scalar_key_is_a_parse_error() {
        let err = from_yaml_str("? [a, b]\n: value\n").unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = from_path(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(ref e) if e == "toml"));
        assert!(err.to_string().starts_with("E1003"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = from_path(Path::new("/nonexistent/asyncapi.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}

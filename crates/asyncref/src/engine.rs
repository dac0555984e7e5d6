//! The full pipeline: build, resolve, merge, validate.

use std::path::Path;

use asyncref_tree::Node;

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::document::Document;
use crate::error::BuildError;
use crate::resolved::ResolvedDocument;
use crate::resolver::resolve;
use crate::traits::{merge_all, Effective};
use crate::validator::validate;

/// Everything the pipeline produced for one document.
#[derive(Debug)]
pub struct Output {
    /// The typed document as declared.
    pub document: Document,
    /// The dereferenced graph.
    pub resolved: ResolvedDocument,
    /// Operations and messages with their traits applied.
    pub effective: Effective,
    /// Diagnostics from every phase, in phase order.
    pub diagnostics: Diagnostics,
}

impl Output {
    /// Whether the document is unusable as given.
    pub fn has_fatal(&self) -> bool {
        self.diagnostics.has_fatal()
    }
}

/// Run the pipeline on a parsed tree.
///
/// Only a tree that cannot become a document at all (non-mapping root,
/// duplicate keys) is an `Err`. Everything else is reported in
/// [`Output::diagnostics`] and the graph is returned with unresolved slots
/// where resolution failed.
pub fn process(tree: &Node, config: &EngineConfig) -> Result<Output, BuildError> {
    let document = Document::build(tree.clone())?;
    Ok(run(document, config))
}

/// Parse YAML or JSON text and run the pipeline.
pub fn process_str(input: &str, config: &EngineConfig) -> Result<Output, BuildError> {
    let document = Document::from_yaml_str(input)?;
    Ok(run(document, config))
}

/// Load a document from disk and run the pipeline.
pub fn process_path(path: &Path, config: &EngineConfig) -> Result<Output, BuildError> {
    let tree = asyncref_tree::from_path(path)?;
    let document = Document::build(tree)?;
    Ok(run(document, config))
}

fn run(document: Document, config: &EngineConfig) -> Output {
    let mut diagnostics = document.diagnostics().clone();

    let (resolved, resolve_diags) = resolve(&document);
    diagnostics.extend(resolve_diags);

    let (effective, merge_diags) = merge_all(&resolved);
    diagnostics.extend(merge_diags);

    diagnostics.extend(validate(&resolved, config));

    if config.deny_warnings {
        diagnostics.escalate_warnings();
    }

    tracing::debug!(
        diagnostics = diagnostics.len(),
        fatal = diagnostics.has_fatal(),
        "document processed"
    );

    Output {
        document,
        resolved,
        effective,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Code, Severity};
    use std::io::Write;

    const DOC: &str = r##"
asyncapi: "3.0.0"
info:
  title: Orders
channels:
  orders:
    address: "orders/{orderId}"
    parameters:
      orderId:
        location: "$message.payload#/id"
      tenant: {}
    messages:
      created:
        $ref: "#/components/messages/OrderCreated"
operations:
  publishOrder:
    action: send
    channel:
      $ref: "#/channels/orders"
    traits:
      - $ref: "#/components/operationTraits/kafka"
components:
  messages:
    OrderCreated:
      payload:
        type: object
  operationTraits:
    kafka:
      summary: Publishes to Kafka
"##;

    #[test]
    fn pipeline_collects_every_phase() {
        let out = process_str(DOC, &EngineConfig::default()).unwrap();
        assert!(!out.has_fatal(), "{}", out.diagnostics);
        assert_eq!(out.diagnostics.count(Code::UnusedParameter), 1);

        let op = &out.effective.operations[0];
        assert_eq!(op.summary.as_deref(), Some("Publishes to Kafka"));
        assert_eq!(out.effective.messages.len(), 1);
    }

    #[test]
    fn deny_warnings_escalates() {
        let config = EngineConfig::default().with_deny_warnings(true);
        let out = process_str(DOC, &config).unwrap();
        assert!(out.has_fatal());
        let unused = out.diagnostics.with_code(Code::UnusedParameter).next().unwrap();
        assert_eq!(unused.severity, Severity::Fatal);
    }

    #[test]
    fn build_diagnostics_come_first() {
        let out = process_str(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
operations:
  broken:
    action: jump
    channel:
      $ref: "#/channels/missing"
"##,
            &EngineConfig::default(),
        )
        .unwrap();
        let codes: Vec<Code> = out.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![Code::InvalidField, Code::UnresolvedReference]);
    }

    #[test]
    fn duplicate_keys_are_an_error() {
        let tree = asyncref_tree::from_json_str(
            r#"{"asyncapi": "3.0.0", "info": {"title": "a", "title": "b"}}"#,
        )
        .unwrap();
        let err = process(&tree, &EngineConfig::default()).unwrap_err();
        assert!(err.to_string().starts_with("E2001"));
    }

    #[test]
    fn process_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        let out = process_path(file.path(), &EngineConfig::default()).unwrap();
        assert_eq!(out.document.info.title.as_deref(), Some("Orders"));
    }

    #[test]
    fn diagnostics_serialize_to_json() {
        let out = process_str(DOC, &EngineConfig::default()).unwrap();
        let json = serde_json::to_value(&out.diagnostics).unwrap();
        assert_eq!(json[0]["code"], "unused_parameter");
        assert_eq!(json[0]["severity"], "warning");
        assert_eq!(json[0]["path"], "#/channels/orders/parameters/tenant");
    }
}

//! Structural constraints on the resolved graph.
//!
//! Scope rules are enforced while resolving, where the reference site is
//! known; everything here runs on resolved definitions, each checked once
//! no matter how many places reference it.

use std::collections::HashSet;
use std::sync::OnceLock;

use asyncref_tree::NodePath;
use regex_lite::Regex;

use crate::config::{EngineConfig, LintLevel};
use crate::diagnostics::{Code, Diagnostics};
use crate::resolved::{
    ResolvedChannel, ResolvedDocument, ResolvedMessage, ResolvedReply, ResolvedServer, Slot,
};

/// `{name}` tokens in channel addresses and server host/pathname.
fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("valid token regex"))
}

/// `$message.header` or `$message.payload`, optionally with a `#` fragment
/// holding a JSON pointer.
fn runtime_expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$message\.(header|payload)(#(/([^/~]|~[01])*)*)?$")
            .expect("valid runtime expression regex")
    })
}

/// Names of the `{token}`s in a template, in order of appearance.
pub fn template_tokens(template: &str) -> Vec<&str> {
    token_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Whether `expr` is a well-formed runtime expression.
pub fn is_runtime_expression(expr: &str) -> bool {
    runtime_expression_regex().is_match(expr)
}

/// Check the constraints that need the resolved graph.
pub fn validate(doc: &ResolvedDocument, config: &EngineConfig) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    for server in doc.distinct_servers() {
        check_server_variables(&server, &mut diagnostics);
    }

    for channel in doc.distinct_channels() {
        check_channel_parameters(&channel, config, &mut diagnostics);
    }

    // Runtime expressions (E2305)
    if config.runtime_expressions {
        for param in doc.distinct_parameters() {
            if let Some(location) = &param.location {
                check_runtime_expression(location, &param.path, &mut diagnostics);
            }
        }
        for address in doc.distinct_reply_addresses() {
            if let Some(location) = &address.location {
                check_runtime_expression(location, &address.path, &mut diagnostics);
            }
        }
    }

    // Operation messages must belong to the operation's channel (E2301)
    for op in doc.distinct_operations() {
        if let Some(channel) = op.channel.as_ref().and_then(Slot::value) {
            check_containment(
                &op.messages,
                &op.path.key("messages"),
                channel,
                "operation",
                &mut diagnostics,
            );
        }
    }

    for reply in doc.distinct_replies() {
        check_reply(&reply, &mut diagnostics);
    }

    tracing::debug!(diagnostics = diagnostics.len(), "constraints validated");
    diagnostics
}

fn check_server_variables(server: &ResolvedServer, diagnostics: &mut Diagnostics) {
    for (field, key) in [(&server.host, "host"), (&server.pathname, "pathname")] {
        let Some(template) = field else {
            continue;
        };
        for token in template_tokens(template) {
            if !server.variables.contains_key(token) {
                diagnostics.fatal(
                    Code::UndefinedServerVariable,
                    &server.path.key(key),
                    format!(
                        "{} '{}' uses '{{{}}}' but the server defines no variable '{}'",
                        key, template, token, token
                    ),
                );
            }
        }
    }
}

fn check_channel_parameters(
    channel: &ResolvedChannel,
    config: &EngineConfig,
    diagnostics: &mut Diagnostics,
) {
    // An unknown address has no tokens to check parameters against.
    let Some(address) = &channel.address else {
        return;
    };
    let tokens = template_tokens(address);

    // Missing parameters (E2302)
    let mut reported = HashSet::new();
    for token in &tokens {
        if !channel.parameters.contains_key(token) && reported.insert(*token) {
            diagnostics.fatal(
                Code::MissingParameterDefinition,
                &channel.path,
                format!(
                    "address '{}' uses '{{{}}}' but the channel defines no parameter '{}'",
                    address, token, token
                ),
            );
        }
    }

    // Unused parameters (E2303)
    for name in channel.parameters.keys() {
        if tokens.contains(&name) {
            continue;
        }
        let path = channel.path.key("parameters").key(name);
        let message = format!("parameter '{}' does not appear in address '{}'", name, address);
        match config.unused_parameters {
            LintLevel::Allow => {}
            LintLevel::Warn => diagnostics.warning(Code::UnusedParameter, &path, message),
            LintLevel::Deny => diagnostics.fatal(Code::UnusedParameter, &path, message),
        }
    }
}

fn check_runtime_expression(expr: &str, owner: &NodePath, diagnostics: &mut Diagnostics) {
    if !is_runtime_expression(expr) {
        diagnostics.fatal(
            Code::InvalidRuntimeExpression,
            &owner.key("location"),
            format!(
                "'{}' is not a runtime expression (expected $message.header or $message.payload, optionally followed by #/pointer)",
                expr
            ),
        );
    }
}

fn check_containment(
    messages: &[Slot<ResolvedMessage>],
    list: &NodePath,
    channel: &ResolvedChannel,
    owner: &str,
    diagnostics: &mut Diagnostics,
) {
    let allowed = channel.message_paths();
    for (i, slot) in messages.iter().enumerate() {
        let Some(message) = slot.value() else {
            continue;
        };
        if !allowed.contains(&message.path) {
            diagnostics.fatal(
                Code::ContainmentViolation,
                &list.index(i),
                format!(
                    "{} message {} is not one of the messages of channel {}",
                    owner, message.path, channel.path
                ),
            );
        }
    }
}

fn check_reply(reply: &ResolvedReply, diagnostics: &mut Diagnostics) {
    let Some(channel) = reply.channel.as_ref().and_then(Slot::value) else {
        return;
    };

    // Reply messages must belong to the reply channel (E2301)
    check_containment(
        &reply.messages,
        &reply.path.key("messages"),
        channel,
        "reply",
        diagnostics,
    );

    // Reply address and reply channel address both set (E2304)
    if reply.address.is_some() && channel.address.is_some() {
        diagnostics.fatal(
            Code::AmbiguousReplyAddress,
            &reply.path.key("address"),
            format!(
                "reply sets an address while its channel {} already has address '{}'",
                channel.path,
                channel.address.as_deref().unwrap_or_default()
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::document::Document;
    use crate::resolver::resolve;

    fn validate_yaml(yaml: &str, config: &EngineConfig) -> Diagnostics {
        let doc = Document::from_yaml_str(yaml).unwrap();
        assert!(doc.diagnostics().is_empty(), "{}", doc.diagnostics());
        let (graph, diags) = resolve(&doc);
        assert!(diags.is_empty(), "{}", diags);
        validate(&graph, config)
    }

    #[test]
    fn tokens_in_order() {
        assert_eq!(template_tokens("user/{id}/{event}"), vec!["id", "event"]);
        assert_eq!(template_tokens("{}"), vec![""]);
        assert!(template_tokens("plain/address").is_empty());
    }

    #[test]
    fn runtime_expressions() {
        assert!(is_runtime_expression("$message.payload"));
        assert!(is_runtime_expression("$message.header#"));
        assert!(is_runtime_expression("$message.header#/replyTo"));
        assert!(is_runtime_expression("$message.payload#/user/id"));
        assert!(is_runtime_expression("$message.payload#/a~1b/~0c"));
        assert!(!is_runtime_expression("$message.body#/id"));
        assert!(!is_runtime_expression("$message.payload/user"));
        assert!(!is_runtime_expression("$message.payload#user"));
        assert!(!is_runtime_expression("$message.payload#/a~2"));
        assert!(!is_runtime_expression("payload#/id"));
    }

    const PARAMS: &str = r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  created:
    address: "user/{id}/created"
    parameters:
      region:
        description: unused
"##;

    #[test]
    fn missing_and_unused_parameters() {
        let diags = validate_yaml(PARAMS, &EngineConfig::default());
        assert_eq!(diags.len(), 2, "{}", diags);

        let missing = diags.with_code(Code::MissingParameterDefinition).next().unwrap();
        assert_eq!(missing.path.to_string(), "#/channels/created");
        assert_eq!(missing.severity, Severity::Fatal);

        let unused = diags.with_code(Code::UnusedParameter).next().unwrap();
        assert_eq!(unused.path.to_string(), "#/channels/created/parameters/region");
        assert_eq!(unused.severity, Severity::Warning);
    }

    #[test]
    fn defining_the_parameter_clears_it() {
        let yaml = PARAMS.replace("      region:\n", "      id:\n");
        let diags = validate_yaml(&yaml, &EngineConfig::default());
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn unused_parameter_level() {
        let allow = EngineConfig::default().with_unused_parameters(LintLevel::Allow);
        let diags = validate_yaml(PARAMS, &allow);
        assert_eq!(diags.count(Code::UnusedParameter), 0);

        let deny = EngineConfig::default().with_unused_parameters(LintLevel::Deny);
        let diags = validate_yaml(PARAMS, &deny);
        let unused = diags.with_code(Code::UnusedParameter).next().unwrap();
        assert_eq!(unused.severity, Severity::Fatal);
    }

    #[test]
    fn null_address_skips_parameter_checks() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  dynamic:
    address: null
    parameters:
      id:
        location: "$message.payload#/id"
"##,
            &EngineConfig::default(),
        );
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn invalid_parameter_location() {
        let yaml = r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  created:
    address: "user/{id}"
    parameters:
      id:
        location: "$message.body#/id"
"##;
        let diags = validate_yaml(yaml, &EngineConfig::default());
        assert_eq!(diags.count(Code::InvalidRuntimeExpression), 1, "{}", diags);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.path.to_string(), "#/channels/created/parameters/id/location");

        let mut config = EngineConfig::default();
        config.runtime_expressions = false;
        assert!(validate_yaml(yaml, &config).is_empty());
    }

    #[test]
    fn operation_message_outside_channel() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
    messages:
      created:
        payload:
          type: string
  other:
    address: other
    messages:
      deleted:
        payload:
          type: string
operations:
  publish:
    action: send
    channel:
      $ref: "#/channels/events"
    messages:
      - $ref: "#/channels/events/messages/created"
      - $ref: "#/channels/other/messages/deleted"
"##,
            &EngineConfig::default(),
        );
        assert_eq!(diags.len(), 1, "{}", diags);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.code, Code::ContainmentViolation);
        assert_eq!(diag.path.to_string(), "#/operations/publish/messages/1");
    }

    #[test]
    fn containment_follows_shared_definitions() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  events:
    address: events
    messages:
      created:
        $ref: "#/components/messages/Created"
operations:
  publish:
    action: send
    channel:
      $ref: "#/channels/events"
    messages:
      - $ref: "#/components/messages/Created"
components:
  messages:
    Created:
      payload:
        type: string
"##,
            &EngineConfig::default(),
        );
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn reply_checks() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  requests:
    address: requests
    messages:
      ping:
        payload:
          type: string
  replies:
    address: replies
    messages:
      pong:
        payload:
          type: string
operations:
  ping:
    action: send
    channel:
      $ref: "#/channels/requests"
    reply:
      address:
        location: "$message.header#/replyTo"
      channel:
        $ref: "#/channels/replies"
      messages:
        - $ref: "#/channels/requests/messages/ping"
"##,
            &EngineConfig::default(),
        );
        assert_eq!(diags.len(), 2, "{}", diags);
        let codes: Vec<Code> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![Code::ContainmentViolation, Code::AmbiguousReplyAddress]
        );
        let paths: Vec<String> = diags.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "#/operations/ping/reply/messages/0",
                "#/operations/ping/reply/address"
            ]
        );
    }

    #[test]
    fn undefined_server_variable() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
servers:
  prod:
    host: "{region}.broker.example.com:{port}"
    protocol: kafka
    variables:
      port:
        default: "9092"
"##,
            &EngineConfig::default(),
        );
        assert_eq!(diags.len(), 1, "{}", diags);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.code, Code::UndefinedServerVariable);
        assert_eq!(diag.path.to_string(), "#/servers/prod/host");
        assert!(diag.message.contains("'region'"));
    }

    #[test]
    fn shared_channel_is_validated_once() {
        let diags = validate_yaml(
            r##"
asyncapi: "3.0.0"
info:
  title: Test
channels:
  created:
    $ref: "#/components/channels/created"
operations:
  a:
    action: send
    channel:
      $ref: "#/channels/created"
  b:
    action: receive
    channel:
      $ref: "#/channels/created"
components:
  channels:
    created:
      address: "user/{id}"
"##,
            &EngineConfig::default(),
        );
        assert_eq!(diags.count(Code::MissingParameterDefinition), 1, "{}", diags);
    }
}

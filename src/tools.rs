use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod policy;
pub mod response;
pub mod slots;

pub use policy::Action;
pub use response::{Reply, ResponseTemplates};

/// Facts recognised so far in a conversation, keyed by slot name.
pub type Facts = BTreeMap<String, String>;

pub const ORDER_NUMBER: &str = "order_number";
pub const CARD_INFO: &str = "card_info";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not found")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: ToolName, message: String },

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("template render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ExtractSlots,
    PolicyDecision,
    GenerateResponse,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::ExtractSlots,
        ToolName::PolicyDecision,
        ToolName::GenerateResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ExtractSlots => "extract_slots",
            ToolName::PolicyDecision => "policy_decision",
            ToolName::GenerateResponse => "generate_response",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolName::ExtractSlots => {
                "Extract order numbers and card digits from user input into the fact map."
            }
            ToolName::PolicyDecision => {
                "Choose the next bot action from the conversation goal and known facts."
            }
            ToolName::GenerateResponse => "Render the bot utterance for an action.",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractSlotsArgs {
    pub user_input: String,
    #[serde(default)]
    pub current_slots: Facts,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PolicyDecisionArgs {
    pub goal: String,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub available_slots: Facts,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerateResponseArgs {
    pub action: Action,
    #[serde(default)]
    pub slots: Facts,
}

/// A fully typed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    ExtractSlots(ExtractSlotsArgs),
    PolicyDecision(PolicyDecisionArgs),
    GenerateResponse(GenerateResponseArgs),
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::ExtractSlots(_) => ToolName::ExtractSlots,
            ToolCall::PolicyDecision(_) => ToolName::PolicyDecision,
            ToolCall::GenerateResponse(_) => ToolName::GenerateResponse,
        }
    }

    /// Builds a call from a tool name and a named-argument bundle.
    pub fn from_json(name: &str, arguments: Value) -> Result<Self, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let invalid = |error: serde_json::Error| ToolError::InvalidArguments {
            tool,
            message: error.to_string(),
        };

        Ok(match tool {
            ToolName::ExtractSlots => {
                ToolCall::ExtractSlots(serde_json::from_value(arguments).map_err(invalid)?)
            }
            ToolName::PolicyDecision => {
                ToolCall::PolicyDecision(serde_json::from_value(arguments).map_err(invalid)?)
            }
            ToolName::GenerateResponse => {
                ToolCall::GenerateResponse(serde_json::from_value(arguments).map_err(invalid)?)
            }
        })
    }
}

/// Uniform envelope returned by every tool.
///
/// A failed tool still carries a payload: the safe default the caller can
/// continue with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult<T> {
    pub success: bool,
    pub payload: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ToolResult<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    pub fn failed(payload: T, error: impl ToString) -> Self {
        Self {
            success: false,
            payload,
            error: Some(error.to_string()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ToolResult<U> {
        ToolResult {
            success: self.success,
            payload: f(self.payload),
            error: self.error,
        }
    }

    fn settle(outcome: Result<T, ToolError>, fallback: impl FnOnce() -> T) -> Self {
        match outcome {
            Ok(payload) => Self::ok(payload),
            Err(error) => Self::failed(fallback(), error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Slots(Facts),
    Decision { action: Action },
    Response(Reply),
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: &'static str,
    pub parameters: Value,
}

/// The decision tools available to one simulation run.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    responses: ResponseTemplates,
}

impl ToolRegistry {
    pub fn new(responses: ResponseTemplates) -> Self {
        Self { responses }
    }

    pub fn standard() -> Result<Self, ToolError> {
        Ok(Self::new(ResponseTemplates::standard()?))
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolName::ALL
            .into_iter()
            .map(|name| ToolDefinition {
                name,
                description: name.description(),
                parameters: match name {
                    ToolName::ExtractSlots => json_schema_for::<ExtractSlotsArgs>(),
                    ToolName::PolicyDecision => json_schema_for::<PolicyDecisionArgs>(),
                    ToolName::GenerateResponse => json_schema_for::<GenerateResponseArgs>(),
                },
            })
            .collect()
    }

    /// On failure the payload is the caller's facts, untouched.
    pub fn extract_slots(&self, args: &ExtractSlotsArgs) -> ToolResult<Facts> {
        ToolResult::settle(
            slots::extract_slots(&args.user_input, &args.current_slots),
            || args.current_slots.clone(),
        )
    }

    pub fn policy_decision(&self, args: &PolicyDecisionArgs) -> ToolResult<Action> {
        ToolResult::settle(
            Ok(policy::decide(&args.goal, &args.available_slots)),
            || Action::AskClarify,
        )
    }

    pub fn generate_response(&self, args: &GenerateResponseArgs) -> ToolResult<Reply> {
        ToolResult::settle(
            self.responses
                .render(&args.action, &args.slots)
                .map(|utterance| Reply::new(args.action.clone(), utterance)),
            Reply::apology,
        )
    }

    pub fn invoke(&self, call: &ToolCall) -> ToolResult<ToolPayload> {
        match call {
            ToolCall::ExtractSlots(args) => self.extract_slots(args).map(ToolPayload::Slots),
            ToolCall::PolicyDecision(args) => self
                .policy_decision(args)
                .map(|action| ToolPayload::Decision { action }),
            ToolCall::GenerateResponse(args) => {
                self.generate_response(args).map(ToolPayload::Response)
            }
        }
    }

    /// Name-based entry point. Unknown names and malformed arguments come
    /// back as failed envelopes, never as errors.
    pub fn invoke_named(&self, name: &str, arguments: Value) -> ToolResult<ToolPayload> {
        match ToolCall::from_json(name, arguments) {
            Ok(call) => self.invoke(&call),
            Err(error) => ToolResult::failed(ToolPayload::Empty, error),
        }
    }
}

pub fn json_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema.schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::standard().expect("standard registry")
    }

    #[test]
    fn unknown_tool_returns_failed_envelope() {
        let result = registry().invoke_named("book_flight", json!({}));
        assert!(!result.success);
        assert_eq!(result.payload, ToolPayload::Empty);
        assert_eq!(result.error.as_deref(), Some("Tool book_flight not found"));
    }

    #[test]
    fn malformed_arguments_return_failed_envelope() {
        let result = registry().invoke_named("policy_decision", json!({ "goal": 42 }));
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("invalid arguments for policy_decision"));
    }

    #[test]
    fn named_dispatch_runs_the_pipeline() {
        let tools = registry();

        let slots = tools.invoke_named(
            "extract_slots",
            json!({ "user_input": "order 12,345 arrived broken", "current_slots": {} }),
        );
        let ToolPayload::Slots(facts) = slots.payload else {
            panic!("expected slots payload");
        };
        assert_eq!(facts.get(ORDER_NUMBER).map(String::as_str), Some("12345"));

        let decision = tools.invoke_named(
            "policy_decision",
            json!({ "goal": "Return a damaged item", "user_input": "", "available_slots": facts }),
        );
        assert_eq!(
            decision.payload,
            ToolPayload::Decision {
                action: Action::ConfirmReturn
            }
        );

        let reply = tools.invoke_named(
            "generate_response",
            json!({ "action": "CONFIRM_RETURN", "slots": { "order_number": "12345" } }),
        );
        assert!(reply.success);
        let ToolPayload::Response(reply) = reply.payload else {
            panic!("expected response payload");
        };
        assert!(reply.utterance.contains("initiated the return for order 12345"));
    }

    #[test]
    fn failed_render_falls_back_to_apology() {
        let templates =
            ResponseTemplates::from_table([(Action::AskClarify, "Pardon? {{missing_fact}}")])
                .expect("templates");
        let tools = ToolRegistry::new(templates);

        let result = tools.generate_response(&GenerateResponseArgs {
            action: Action::AskClarify,
            slots: Facts::new(),
        });

        assert!(!result.success);
        assert_eq!(result.payload, Reply::apology());
        assert!(result.error.is_some());
    }

    #[test]
    fn definitions_cover_every_tool() {
        let definitions = registry().definitions();
        let names: Vec<_> = definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["extract_slots", "policy_decision", "generate_response"]);

        let extract = &definitions[0].parameters;
        assert!(extract["properties"].get("user_input").is_some());
        assert_eq!(extract["required"], json!(["user_input"]));
    }
}

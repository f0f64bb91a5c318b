//! Transcript units: turns, tool calls and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Why a turn ended in a fallback message instead of a model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnFailure {
    /// Transient provider failures outlasted every retry.
    ProviderUnavailable,
    /// The provider answered with something unusable.
    ProviderProtocol,
    /// The model kept calling tools past the iteration bound.
    MaxIterationsExceeded,
}

/// A structured function call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within the response that produced it.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Category of a failed tool dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    UnknownTool,
    InvalidArguments,
    ExecutionFailed,
}

/// Error half of a tool result; fed back to the model, never shown raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub message: String,
}

/// Outcome of dispatching one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub outcome: Result<Map<String, Value>, ToolFailure>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Ok(payload),
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        kind: ToolFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Err(ToolFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.outcome.as_ref().ok()
    }

    pub fn failure_kind(&self) -> Option<ToolFailureKind> {
        self.outcome.as_ref().err().map(|f| f.kind)
    }

    /// JSON form sent back to the provider.
    pub fn to_response_value(&self) -> Value {
        match &self.outcome {
            Ok(payload) => serde_json::json!({ "result": payload }),
            Err(failure) => serde_json::json!({
                "error": { "kind": failure.kind, "message": failure.message }
            }),
        }
    }
}

/// One message-equivalent unit of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TurnFailure>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Some(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(text.into()))
    }

    /// Assistant fallback turn carrying the reason the turn errored.
    pub fn assistant_failed(text: impl Into<String>, failure: TurnFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::assistant(text)
        }
    }

    /// A batch of calls plus their results, both in the order the model issued them.
    pub fn tool(text: Option<String>, calls: Vec<ToolCall>, results: Vec<ToolResult>) -> Self {
        Self {
            tool_calls: calls,
            tool_results: results,
            ..Self::new(Role::Tool, text)
        }
    }

    fn new(role: Role, text: Option<String>) -> Self {
        Self {
            role,
            text,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.failure.is_some()
    }

    /// Every call in this turn has exactly one result with the same id.
    pub fn calls_are_resolved(&self) -> bool {
        self.tool_calls.len() == self.tool_results.len()
            && self
                .tool_calls
                .iter()
                .zip(&self.tool_results)
                .all(|(call, result)| call.id == result.call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_drops_non_object_args() {
        let call = ToolCall::new("c1", "buscar_preco", json!("oops"));
        assert!(call.args.is_empty());
    }

    #[test]
    fn failure_result_serialises_kind() {
        let result = ToolResult::failure("c1", ToolFailureKind::UnknownTool, "no such tool");
        let value = result.to_response_value();
        assert_eq!(value["error"]["kind"], "unknown_tool");
        assert_eq!(value["error"]["message"], "no such tool");
        assert_eq!(result.failure_kind(), Some(ToolFailureKind::UnknownTool));
    }

    #[test]
    fn resolved_calls_require_matching_ids_in_order() {
        let calls = vec![
            ToolCall::new("a", "x", json!({})),
            ToolCall::new("b", "y", json!({})),
        ];
        let ordered = Turn::tool(
            None,
            calls.clone(),
            vec![
                ToolResult::success("a", Map::new()),
                ToolResult::success("b", Map::new()),
            ],
        );
        assert!(ordered.calls_are_resolved());

        let swapped = Turn::tool(
            None,
            calls,
            vec![
                ToolResult::success("b", Map::new()),
                ToolResult::success("a", Map::new()),
            ],
        );
        assert!(!swapped.calls_are_resolved());
    }

    #[test]
    fn turn_survives_json_round_trip() {
        let turn = Turn::assistant_failed("Desculpe", TurnFailure::MaxIterationsExceeded);
        let raw = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, turn);
        assert!(back.is_errored());
    }
}

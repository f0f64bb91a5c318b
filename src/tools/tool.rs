//! Tool trait and the per-dispatch context handed to handlers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::session::ConversationSession;
use crate::crm::LeadId;

/// Handler-level failure. The registry turns these into tool results.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {}", .0.join("; "))]
    InvalidParameters(Vec<String>),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(vec![message.into()])
    }
}

/// Successful handler output.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    /// Payload as a JSON object; scalars are wrapped under `"value"`.
    pub fn into_payload(self) -> Map<String, Value> {
        match self.result {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        }
    }
}

/// Session-scoped state a handler may read or update.
///
/// Built from the session before a batch of calls and written back after it.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    /// Sticky handoff flag; handlers may only set it.
    pub human_handoff: bool,
    /// Leads created in this conversation, keyed by normalised WhatsApp.
    pub leads_by_whatsapp: HashMap<String, LeadId>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn for_session(session: &ConversationSession) -> Self {
        Self {
            session_id: session.id.clone(),
            human_handoff: session.state.human_handoff,
            leads_by_whatsapp: session.leads_by_whatsapp(),
        }
    }
}

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema `object` describing the arguments.
    fn parameters_schema(&self) -> Value;

    /// Run with arguments already validated and coerced against the schema.
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Fetch a required string argument.
pub fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument `{key}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_output_is_wrapped() {
        let output = ToolOutput::success(json!(42), Duration::ZERO);
        assert_eq!(output.into_payload()["value"], 42);
    }

    #[test]
    fn require_str_reports_key() {
        let args = json!({"nome": "Ana"}).as_object().cloned().unwrap();
        assert_eq!(require_str(&args, "nome").unwrap(), "Ana");
        let err = require_str(&args, "whatsapp").unwrap_err();
        assert!(err.to_string().contains("whatsapp"));
    }
}

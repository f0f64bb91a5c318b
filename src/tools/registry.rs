//! Tool registry: ordered, validated at registration, immutable once built.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::turn::{ToolCall, ToolFailureKind, ToolResult};
use crate::error::ToolError as RegistryError;
use crate::llm::ToolDefinition;
use crate::tools::schema::{coerce_args, validate_schema};
use crate::tools::tool::{Tool, ToolContext, ToolError};

/// Registry of available tools, kept in registration order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool after checking its name and schema.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidSchema {
                name,
                reason: "tool name must not be empty".to_string(),
            });
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        validate_schema(&tool.parameters_schema()).map_err(|reason| {
            RegistryError::InvalidSchema {
                name: name.clone(),
                reason,
            }
        })?;

        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(tool);
        tracing::debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// List all tool names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool definitions for LLM function calling, in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// Run one call. Never fails: every problem becomes a failed result
    /// that is fed back to the model.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &mut ToolContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            tracing::warn!(
                session_id = %ctx.session_id,
                tool = %call.name,
                "Model called an unknown tool"
            );
            return ToolResult::failure(
                &call.id,
                ToolFailureKind::UnknownTool,
                format!(
                    "unknown tool `{}`; available tools: {}",
                    call.name,
                    self.list().join(", ")
                ),
            );
        };

        let args = match coerce_args(&tool.parameters_schema(), &call.args) {
            Ok(args) => args,
            Err(violations) => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    tool = %call.name,
                    violations = violations.len(),
                    "Rejected tool arguments"
                );
                return ToolResult::failure(
                    &call.id,
                    ToolFailureKind::InvalidArguments,
                    violations.join("; "),
                );
            }
        };

        match tool.execute(&args, ctx).await {
            Ok(output) => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    tool = %call.name,
                    elapsed_ms = output.duration.as_millis() as u64,
                    "Tool executed"
                );
                ToolResult::success(&call.id, output.into_payload())
            }
            Err(ToolError::InvalidParameters(violations)) => ToolResult::failure(
                &call.id,
                ToolFailureKind::InvalidArguments,
                violations.join("; "),
            ),
            Err(ToolError::ExecutionFailed(reason)) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    tool = %call.name,
                    error = %reason,
                    "Tool execution failed"
                );
                ToolResult::failure(&call.id, ToolFailureKind::ExecutionFailed, reason)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::ToolOutput;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::time::Instant;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })
        }
        async fn execute(
            &self,
            args: &Map<String, Value>,
            _ctx: &mut ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::success(
                json!({"echo": args["message"]}),
                Instant::now().elapsed(),
            ))
        }
    }

    struct BrokenSchemaTool;

    #[async_trait]
    impl Tool for BrokenSchemaTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Declares a required key it never describes"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": ["ghost"]})
        }
        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _ctx: &mut ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed("unreachable".into()))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _ctx: &mut ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed("store offline".into()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry.register(Arc::new(FailingTool)).unwrap();
        registry
    }

    #[test]
    fn duplicate_and_invalid_registrations_are_rejected() {
        let mut registry = registry();
        assert!(matches!(
            registry.register(Arc::new(EchoTool)),
            Err(RegistryError::Duplicate { .. })
        ));
        assert!(matches!(
            registry.register(Arc::new(BrokenSchemaTool)),
            Err(RegistryError::InvalidSchema { .. })
        ));
        assert_eq!(registry.list(), vec!["echo", "failing"]);
    }

    #[test]
    fn definitions_follow_registration_order() {
        let defs = registry().tool_definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "failing"]);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failed_result() {
        let mut ctx = ToolContext::new("s1");
        let call = ToolCall::new("c1", "agendar_voo", json!({}));
        let result = registry().dispatch(&call, &mut ctx).await;
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.failure_kind(), Some(ToolFailureKind::UnknownTool));
    }

    #[tokio::test]
    async fn missing_argument_becomes_invalid_arguments() {
        let mut ctx = ToolContext::new("s1");
        let call = ToolCall::new("c2", "echo", json!({}));
        let result = registry().dispatch(&call, &mut ctx).await;
        assert_eq!(result.failure_kind(), Some(ToolFailureKind::InvalidArguments));
    }

    #[tokio::test]
    async fn handler_failure_becomes_execution_failed() {
        let mut ctx = ToolContext::new("s1");
        let call = ToolCall::new("c3", "failing", json!({}));
        let result = registry().dispatch(&call, &mut ctx).await;
        assert_eq!(result.failure_kind(), Some(ToolFailureKind::ExecutionFailed));
    }

    #[tokio::test]
    async fn successful_dispatch_uses_coerced_args() {
        let mut ctx = ToolContext::new("s1");
        let call = ToolCall::new("c4", "echo", json!({"message": 7}));
        let result = registry().dispatch(&call, &mut ctx).await;
        assert_eq!(result.payload().unwrap()["echo"], "7");
    }
}

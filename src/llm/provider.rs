//! Provider contract: history plus tool declarations in, text and/or calls out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::turn::{ToolCall, Turn};
use crate::error::LlmError;

/// A callable tool as declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// Everything the provider needs for one round-trip.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
}

/// What the model answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text_parts: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_parts: vec![text.into()],
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text_parts: Vec::new(),
            tool_calls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty() && self.joined_text().trim().is_empty()
    }

    /// Text parts concatenated in order.
    pub fn joined_text(&self) -> String {
        self.text_parts.concat()
    }
}

/// A generative-model endpoint.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Send the full history and tool schema; one attempt, no retries.
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, LlmError>;
}

//! Gemini `generateContent` adapter over plain HTTP.
//!
//! History maps onto Gemini `contents` as follows:
//! - user turn → `user` content with one text part
//! - assistant turn → `model` content with one text part
//! - tool turn → `model` content (text + `functionCall` parts) followed by a
//!   `user` content carrying one `functionResponse` part per call, in order
//!
//! HTTP failures are mapped onto [`LlmError`] so the retry wrapper can tell
//! transient failures from protocol ones.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::agent::turn::{Role, ToolCall, Turn};
use crate::error::LlmError;
use crate::llm::provider::{LlmProvider, ProviderRequest, ProviderResponse, ToolDefinition};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: &str = "gemini";

/// Gemini provider bound to one model.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Protocol {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let body = build_request_body(&request);
        tracing::debug!(
            model = %self.model,
            turns = request.history.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after, &detail));
        }

        let raw = response.text().await.map_err(|e| LlmError::Unavailable {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to read response body: {e}"),
        })?;
        parse_response(&raw)
    }
}

// ── Request mapping ─────────────────────────────────────────────────

fn build_request_body(request: &ProviderRequest) -> Value {
    let mut body = json!({
        "contents": history_to_contents(&request.history),
    });
    if !request.system_prompt.trim().is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": request.system_prompt }] });
    }
    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request.tools.iter().map(function_declaration).collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    body
}

fn function_declaration(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": gemini_schema(&tool.parameters),
    })
}

/// Gemini expects upper-case schema types (`OBJECT`, `STRING`, ...).
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let converted: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                        _ => gemini_schema(value),
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

fn history_to_contents(history: &[Turn]) -> Vec<Value> {
    let mut contents = Vec::with_capacity(history.len());
    for turn in history {
        match turn.role {
            Role::User => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": turn.text.as_deref().unwrap_or_default() }],
                }));
            }
            Role::Assistant => {
                contents.push(json!({
                    "role": "model",
                    "parts": [{ "text": turn.text.as_deref().unwrap_or_default() }],
                }));
            }
            Role::Tool => {
                let mut model_parts = Vec::with_capacity(turn.tool_calls.len() + 1);
                if let Some(text) = turn.text.as_deref().filter(|t| !t.is_empty()) {
                    model_parts.push(json!({ "text": text }));
                }
                for call in &turn.tool_calls {
                    model_parts.push(json!({
                        "functionCall": { "id": call.id, "name": call.name, "args": call.args }
                    }));
                }
                contents.push(json!({ "role": "model", "parts": model_parts }));

                let response_parts: Vec<Value> = turn
                    .tool_calls
                    .iter()
                    .zip(&turn.tool_results)
                    .map(|(call, result)| {
                        json!({
                            "functionResponse": {
                                "id": call.id,
                                "name": call.name,
                                "response": result.to_response_value(),
                            }
                        })
                    })
                    .collect();
                contents.push(json!({ "role": "user", "parts": response_parts }));
            }
        }
    }
    contents
}

// ── Response mapping ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

fn protocol(reason: impl Into<String>) -> LlmError {
    LlmError::Protocol {
        provider: PROVIDER.to_string(),
        reason: reason.into(),
    }
}

fn parse_response(raw: &str) -> Result<ProviderResponse, LlmError> {
    let decoded: GenerateContentResponse = serde_json::from_str(raw)
        .map_err(|e| protocol(format!("Undecodable response body: {e}")))?;

    if let Some(reason) = decoded.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(protocol(format!("Prompt blocked: {reason}")));
    }

    let candidate = decoded
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| protocol("Response has no candidates"))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut response = ProviderResponse::default();
    for part in parts {
        if let Some(text) = part.text {
            response.text_parts.push(text);
        }
        if let Some(call) = part.function_call {
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            response.tool_calls.push(ToolCall::new(id, call.name, call.args));
        }
    }

    if response.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(protocol(format!(
            "Empty candidate (finish reason: {reason})"
        )));
    }
    Ok(response)
}

fn map_status(status: StatusCode, retry_after: Option<Duration>, detail: &str) -> LlmError {
    let provider = PROVIDER.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider,
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed { provider },
        s if s.is_server_error() => LlmError::Unavailable {
            provider,
            reason: format!("HTTP {s}"),
        },
        s => LlmError::Protocol {
            provider,
            reason: format!("HTTP {s}: {}", truncate(detail, 200)),
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Turn executor: drives one user message to a final assistant turn.
//!
//! Each iteration sends the full history to the provider. Tool calls are
//! dispatched in the order the model issued them and appended, with their
//! results, as a single tool turn before the next request. The loop ends on
//! a text-only answer, on provider failure, or after `max_iterations`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::agent::prompts::{APOLOGY, UNABLE_TO_COMPLETE};
use crate::agent::session::{ConversationSession, SessionPhase};
use crate::agent::turn::{ToolCall, Turn, TurnFailure};
use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::llm::retry::send_with_retry;
use crate::llm::{LlmProvider, ProviderRequest, RetryPolicy, ToolDefinition};
use crate::tools::{ToolContext, ToolRegistry};

pub struct TurnExecutor {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    retry: RetryPolicy,
}

impl TurnExecutor {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            attempt_timeout: config.provider_timeout,
        };
        Self {
            llm,
            tools,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Declarations handed to new sessions, in registry order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.tool_definitions()
    }

    /// Append `user_text` and run the model/tool loop until a final turn.
    ///
    /// Always returns an assistant turn; failures become fixed fallback text.
    /// The session is back in `Idle` when this returns.
    pub async fn run_turn(&self, session: &mut ConversationSession, user_text: &str) -> Turn {
        session.push_turn(Turn::user(user_text));
        let turn = self.drive(session).await;
        session.state.phase = SessionPhase::Idle;
        session.push_turn(turn.clone());
        turn
    }

    async fn drive(&self, session: &mut ConversationSession) -> Turn {
        for iteration in 1..=self.config.max_iterations {
            session.state.phase = SessionPhase::AwaitingModel;
            let request = ProviderRequest {
                system_prompt: session.system_prompt.clone(),
                history: session.history().to_vec(),
                tools: session.tool_schema.clone(),
            };

            let response = match send_with_retry(self.llm.as_ref(), &request, &self.retry).await {
                Ok(response) => response,
                Err(e) => return failed_turn(&session.id, &e),
            };

            if response.is_empty() {
                let e = LlmError::Protocol {
                    provider: self.llm.name().to_string(),
                    reason: "response has neither text nor tool calls".to_string(),
                };
                return failed_turn(&session.id, &e);
            }

            if response.tool_calls.is_empty() {
                tracing::debug!(session_id = %session.id, iteration, "Model answered with text");
                return Turn::assistant(response.joined_text());
            }

            if let Some(id) = duplicate_call_id(&response.tool_calls) {
                let e = LlmError::Protocol {
                    provider: self.llm.name().to_string(),
                    reason: format!("tool call id `{id}` appears more than once"),
                };
                return failed_turn(&session.id, &e);
            }

            session.state.phase = SessionPhase::ExecutingTools;
            tracing::info!(
                session_id = %session.id,
                iteration,
                calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            let mut ctx = ToolContext::for_session(session);
            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                results.push(self.tools.dispatch(call, &mut ctx).await);
            }
            if ctx.human_handoff {
                session.state.human_handoff = true;
            }

            let text = Some(response.joined_text()).filter(|t| !t.trim().is_empty());
            session.push_turn(Turn::tool(text, response.tool_calls, results));
        }

        tracing::warn!(
            session_id = %session.id,
            max_iterations = self.config.max_iterations,
            "Turn exceeded iteration bound"
        );
        Turn::assistant_failed(UNABLE_TO_COMPLETE, TurnFailure::MaxIterationsExceeded)
    }
}

fn failed_turn(session_id: &str, error: &LlmError) -> Turn {
    let failure = if error.is_retryable() {
        TurnFailure::ProviderUnavailable
    } else {
        TurnFailure::ProviderProtocol
    };
    tracing::warn!(session_id, error = %error, ?failure, "Turn failed, replying with apology");
    Turn::assistant_failed(APOLOGY, failure)
}

fn duplicate_call_id(calls: &[ToolCall]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(calls.len());
    calls
        .iter()
        .map(|c| c.id.as_str())
        .find(|id| !seen.insert(*id))
}

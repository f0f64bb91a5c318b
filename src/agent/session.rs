//! Conversation session: append-only transcript plus per-session state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::turn::{Role, Turn};
use crate::crm::{LeadId, normalize_whatsapp};
use crate::llm::ToolDefinition;
use crate::tools::builtin::{CREATE_LEAD_TOOL, HANDOVER_TOOL};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Ready for the next user message.
    Idle,
    /// Waiting on the provider.
    AwaitingModel,
    /// Dispatching tool calls from the last response.
    ExecutingTools,
    /// Explicitly reset; history discarded.
    Closed,
    /// Persisted history was unreadable.
    Errored,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingModel => "awaiting_model",
            Self::ExecutingTools => "executing_tools",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// Mutable per-session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// Sticky: once set, the conversation belongs to a human operator.
    pub human_handoff: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            human_handoff: false,
        }
    }
}

/// One persistent, sequentially-processed conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    pub id: String,
    history: Vec<Turn>,
    pub system_prompt: String,
    pub tool_schema: Vec<ToolDefinition>,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
}

impl ConversationSession {
    /// A fresh session with no history.
    pub fn new(
        id: impl Into<String>,
        system_prompt: impl Into<String>,
        tool_schema: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
            system_prompt: system_prompt.into(),
            tool_schema,
            created_at: Utc::now(),
            state: SessionState::default(),
        }
    }

    /// Rebuild a session from persisted turns.
    ///
    /// The handoff flag is derived from the transcript so it survives restarts.
    pub fn resume(
        id: impl Into<String>,
        system_prompt: impl Into<String>,
        tool_schema: Vec<ToolDefinition>,
        history: Vec<Turn>,
    ) -> Self {
        let created_at = history.first().map(|t| t.created_at).unwrap_or_else(Utc::now);
        let mut session = Self::new(id, system_prompt, tool_schema);
        session.created_at = created_at;
        session.state.human_handoff = history_requested_handoff(&history);
        session.history = history;
        session
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Append a turn. History is never rewritten.
    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Leads already created in this conversation, keyed by normalised WhatsApp.
    pub fn leads_by_whatsapp(&self) -> HashMap<String, LeadId> {
        let mut leads = HashMap::new();
        for turn in self.history.iter().filter(|t| t.role == Role::Tool) {
            for (call, result) in turn.tool_calls.iter().zip(&turn.tool_results) {
                if call.name != CREATE_LEAD_TOOL {
                    continue;
                }
                let lead_id = result
                    .payload()
                    .and_then(|p| p.get("lead_id"))
                    .and_then(|v| v.as_i64());
                let whatsapp = call
                    .args
                    .get("whatsapp")
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .map(|w| normalize_whatsapp(&w));
                if let (Some(id), Some(key)) = (lead_id, whatsapp)
                    && !key.is_empty()
                {
                    leads.entry(key).or_insert(id);
                }
            }
        }
        leads
    }

    /// Read-only projection handed to callers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            state: self.state.clone(),
            turns: self.history.clone(),
        }
    }
}

fn history_requested_handoff(history: &[Turn]) -> bool {
    history
        .iter()
        .filter(|t| t.role == Role::Tool)
        .flat_map(|t| t.tool_calls.iter().zip(&t.tool_results))
        .any(|(call, result)| call.name == HANDOVER_TOOL && result.is_success())
}

/// Immutable view of a session for UI callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub turns: Vec<Turn>,
}

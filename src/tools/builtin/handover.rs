//! `handover_humano`: flag the conversation for a human operator.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::builtin::HANDOVER_TOOL;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput};

pub struct HandoverTool;

#[async_trait]
impl Tool for HandoverTool {
    fn name(&self) -> &str {
        HANDOVER_TOOL
    }

    fn description(&self) -> &str {
        "Transfere a conversa para um atendente humano."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        if !ctx.human_handoff {
            tracing::info!(session_id = %ctx.session_id, "Conversation handed over to a human");
        }
        ctx.human_handoff = true;
        Ok(ToolOutput::success(
            json!({ "status": "transferido" }),
            start.elapsed(),
        ))
    }
}

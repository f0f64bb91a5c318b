//! `criar_lead`: register a contact in the CRM funnel.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::crm::{NewLead, normalize_whatsapp};
use crate::store::CrmStore;
use crate::tools::builtin::CREATE_LEAD_TOOL;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, require_str};

/// Creates a lead at the top of the funnel.
///
/// A second call for the same WhatsApp number within a conversation returns
/// the lead created by the first one.
pub struct CreateLeadTool {
    store: Arc<dyn CrmStore>,
}

impl CreateLeadTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateLeadTool {
    fn name(&self) -> &str {
        CREATE_LEAD_TOOL
    }

    fn description(&self) -> &str {
        "Cadastra um novo contato (lead) no sistema de CRM."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nome": {
                    "type": "string",
                    "description": "Nome completo do cliente."
                },
                "whatsapp": {
                    "type": "string",
                    "description": "Número do WhatsApp do cliente com código do país e DDD."
                },
                "origem": {
                    "type": "string",
                    "description": "Canal de onde o lead veio (ex: WhatsApp, Instagram)."
                }
            },
            "required": ["nome", "whatsapp", "origem"]
        })
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = require_str(args, "nome")?;
        let whatsapp = require_str(args, "whatsapp")?;
        let origin = require_str(args, "origem")?;

        let key = normalize_whatsapp(whatsapp);
        if key.is_empty() {
            return Err(ToolError::invalid(
                "argument `whatsapp` must contain at least one digit",
            ));
        }

        if let Some(&lead_id) = ctx.leads_by_whatsapp.get(&key) {
            tracing::info!(
                session_id = %ctx.session_id,
                lead_id,
                "Lead already captured in this conversation"
            );
            return Ok(ToolOutput::success(
                json!({
                    "lead_id": lead_id,
                    "nome": name,
                    "whatsapp": whatsapp,
                    "duplicate": true,
                }),
                start.elapsed(),
            ));
        }

        let lead = self
            .store
            .create_lead(NewLead::captured(name, whatsapp, origin))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to create lead: {e}")))?;
        ctx.leads_by_whatsapp.insert(key, lead.id);

        tracing::info!(session_id = %ctx.session_id, lead_id = lead.id, "Lead created");
        Ok(ToolOutput::success(
            json!({
                "lead_id": lead.id,
                "nome": lead.name,
                "whatsapp": lead.whatsapp,
                "origem": lead.origin,
                "status": lead.status,
                "duplicate": false,
            }),
            start.elapsed(),
        ))
    }
}

//! `buscar_preco`: look a service up in the price catalog.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value, json};

use crate::store::CrmStore;
use crate::tools::builtin::PRICE_LOOKUP_TOOL;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, require_str};

pub struct PriceLookupTool {
    store: Arc<dyn CrmStore>,
}

impl PriceLookupTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PriceLookupTool {
    fn name(&self) -> &str {
        PRICE_LOOKUP_TOOL
    }

    fn description(&self) -> &str {
        "Consulta o valor de um serviço específico."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "servico": {
                    "type": "string",
                    "description": "Nome do serviço a ser consultado."
                }
            },
            "required": ["servico"]
        })
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let service = require_str(args, "servico")?;
        let catalog = self
            .store
            .price_catalog()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to load catalog: {e}")))?;

        // A miss is an answer, not an error: the model offers the known services.
        let result = match catalog.lookup(service) {
            Some((name, price)) => json!({
                "found": true,
                "servico": name,
                "preco": decimal_to_json(price),
                "moeda": "BRL",
            }),
            None => {
                tracing::debug!(session_id = %ctx.session_id, service, "Service not in catalog");
                json!({
                    "found": false,
                    "servico": service,
                    "servicos_disponiveis": catalog.services().collect::<Vec<_>>(),
                })
            }
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

/// Whole amounts as JSON integers, fractional ones as floats.
fn decimal_to_json(amount: Decimal) -> Value {
    if amount.fract().is_zero() {
        if let Some(whole) = amount.to_i64() {
            return Value::from(whole);
        }
    }
    amount
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(amount.to_string()))
}

//! `criar_agendamento`: book a service for a client.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value, json};

use crate::crm::NewAppointment;
use crate::store::CrmStore;
use crate::tools::builtin::CREATE_APPOINTMENT_TOOL;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, require_str};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%Hh%M"];

pub struct CreateAppointmentTool {
    store: Arc<dyn CrmStore>,
}

impl CreateAppointmentTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateAppointmentTool {
    fn name(&self) -> &str {
        CREATE_APPOINTMENT_TOOL
    }

    fn description(&self) -> &str {
        "Agenda um novo serviço para um cliente."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nome_do_cliente": {
                    "type": "string",
                    "description": "Nome completo do cliente para quem o agendamento será feito."
                },
                "servico": {
                    "type": "string",
                    "description": "Nome do serviço desejado (ex: Micropigmentação, Limpeza de Pele)."
                },
                "profissional": {
                    "type": "string",
                    "description": "Nome do profissional que realizará o serviço."
                },
                "data": {
                    "type": "string",
                    "description": "Data do agendamento no formato AAAA-MM-DD."
                },
                "hora": {
                    "type": "string",
                    "description": "Hora do agendamento no formato HH:MM."
                }
            },
            "required": ["nome_do_cliente", "servico", "profissional", "data", "hora"]
        })
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let client = require_str(args, "nome_do_cliente")?;
        let service = require_str(args, "servico")?;
        let professional = require_str(args, "profissional")?;
        let date_time = parse_date_time(require_str(args, "data")?, require_str(args, "hora")?)?;

        let appointment = self
            .store
            .create_appointment(NewAppointment {
                lead_name: client.to_string(),
                service: service.to_string(),
                professional: professional.to_string(),
                date_time,
            })
            .await
            .map_err(|e| {
                ToolError::ExecutionFailed(format!("failed to create appointment: {e}"))
            })?;

        tracing::info!(
            session_id = %ctx.session_id,
            appointment_id = appointment.id,
            date_time = %appointment.date_time,
            "Appointment booked"
        );
        Ok(ToolOutput::success(
            json!({
                "appointment_id": appointment.id,
                "nome_do_cliente": appointment.lead_name,
                "servico": appointment.service,
                "profissional": appointment.professional,
                "data": appointment.date_time.format("%Y-%m-%d").to_string(),
                "hora": appointment.date_time.format("%H:%M").to_string(),
            }),
            start.elapsed(),
        ))
    }
}

/// Combine a date and a time of day into one wall-clock instant.
///
/// Both halves are checked so the model learns about every bad field at once.
fn parse_date_time(date: &str, time: &str) -> Result<NaiveDateTime, ToolError> {
    let parsed_date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok());
    let parsed_time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time, fmt).ok());

    match (parsed_date, parsed_time) {
        (Some(d), Some(t)) => Ok(d.and_time(t)),
        (d, t) => {
            let mut violations = Vec::new();
            if d.is_none() {
                violations.push(format!(
                    "argument `data` ({date:?}) is not a valid date; use AAAA-MM-DD"
                ));
            }
            if t.is_none() {
                violations.push(format!(
                    "argument `hora` ({time:?}) is not a valid time; use HH:MM"
                ));
            }
            Err(ToolError::InvalidParameters(violations))
        }
    }
}

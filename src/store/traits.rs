//! Storage boundaries: CRM records and conversation transcripts.

use async_trait::async_trait;

use crate::agent::turn::Turn;
use crate::crm::{Appointment, Lead, LeadId, LeadStatus, NewAppointment, NewLead, PriceCatalog};
use crate::error::DatabaseError;

/// CRM side effects available to tools and dashboard reads.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Insert a lead and return it with its assigned id.
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, DatabaseError>;

    /// Insert an appointment and return it with its assigned id.
    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Appointment, DatabaseError>;

    /// Current service price list.
    async fn price_catalog(&self) -> Result<PriceCatalog, DatabaseError>;

    /// All leads, newest first.
    async fn list_leads(&self) -> Result<Vec<Lead>, DatabaseError>;

    /// All appointments, soonest first.
    async fn list_appointments(&self) -> Result<Vec<Appointment>, DatabaseError>;

    /// Move a lead to another funnel stage.
    async fn update_lead_status(&self, id: LeadId, status: LeadStatus) -> Result<(), DatabaseError>;
}

/// Transcript persistence, one history per session id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// `Ok(None)` when nothing was stored; `Err(Serialization)` when the stored
    /// transcript cannot be read back.
    async fn load_history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, DatabaseError>;

    /// Replace the stored transcript.
    async fn save_history(&self, session_id: &str, turns: &[Turn]) -> Result<(), DatabaseError>;

    /// Drop the stored transcript, if any.
    async fn delete_history(&self, session_id: &str) -> Result<(), DatabaseError>;
}

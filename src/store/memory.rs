//! In-memory store for tests and database-less runs.
//!
//! Histories are kept as serialized JSON so a load exercises the same decode
//! path (and the same corruption handling) as the libSQL backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::turn::Turn;
use crate::crm::{
    Appointment, AppointmentId, Lead, LeadId, LeadStatus, NewAppointment, NewLead, PriceCatalog,
};
use crate::error::DatabaseError;
use crate::store::traits::{CrmStore, HistoryStore};

#[derive(Default)]
struct CrmTables {
    leads: Vec<Lead>,
    appointments: Vec<Appointment>,
    next_lead_id: LeadId,
    next_appointment_id: AppointmentId,
}

/// Process-local CRM and transcript storage.
pub struct MemoryStore {
    crm: RwLock<CrmTables>,
    catalog: PriceCatalog,
    histories: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Empty store with the studio's default catalog.
    pub fn new() -> Self {
        Self::with_catalog(PriceCatalog::studio_default())
    }

    pub fn with_catalog(catalog: PriceCatalog) -> Self {
        Self {
            crm: RwLock::new(CrmTables {
                next_lead_id: 1,
                next_appointment_id: 1,
                ..Default::default()
            }),
            catalog,
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Overwrite a stored transcript with raw text (used to simulate corruption).
    pub async fn put_raw_history(&self, session_id: &str, raw: impl Into<String>) {
        self.histories
            .write()
            .await
            .insert(session_id.to_string(), raw.into());
    }

    pub async fn has_history(&self, session_id: &str) -> bool {
        self.histories.read().await.contains_key(session_id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, DatabaseError> {
        let mut crm = self.crm.write().await;
        let id = crm.next_lead_id;
        crm.next_lead_id += 1;
        let lead = lead.into_lead(id);
        crm.leads.push(lead.clone());
        Ok(lead)
    }

    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Appointment, DatabaseError> {
        let mut crm = self.crm.write().await;
        let id = crm.next_appointment_id;
        crm.next_appointment_id += 1;
        let appointment = appointment.into_appointment(id);
        crm.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn price_catalog(&self) -> Result<PriceCatalog, DatabaseError> {
        Ok(self.catalog.clone())
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, DatabaseError> {
        let crm = self.crm.read().await;
        Ok(crm.leads.iter().rev().cloned().collect())
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, DatabaseError> {
        let mut appointments = self.crm.read().await.appointments.clone();
        appointments.sort_by_key(|a| a.date_time);
        Ok(appointments)
    }

    async fn update_lead_status(
        &self,
        id: LeadId,
        status: LeadStatus,
    ) -> Result<(), DatabaseError> {
        let mut crm = self.crm.write().await;
        let lead = crm
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            })?;
        lead.status = status;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load_history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, DatabaseError> {
        let histories = self.histories.read().await;
        match histories.get(session_id) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("history {session_id}: {e}"))),
            None => Ok(None),
        }
    }

    async fn save_history(&self, session_id: &str, turns: &[Turn]) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(turns)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.histories
            .write()
            .await
            .insert(session_id.to_string(), raw);
        Ok(())
    }

    async fn delete_history(&self, session_id: &str) -> Result<(), DatabaseError> {
        self.histories.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn leads_get_sequential_ids_and_list_newest_first() {
        let store = MemoryStore::new();
        let a = store
            .create_lead(NewLead::captured("Ana", "+5511", "Instagram"))
            .await
            .unwrap();
        let b = store
            .create_lead(NewLead::captured("Bruno", "+5521", "WhatsApp"))
            .await
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let leads = store.list_leads().await.unwrap();
        assert_eq!(leads[0].name, "Bruno");
    }

    #[tokio::test]
    async fn appointments_sorted_by_time() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 11, 3).unwrap();
        for (hour, who) in [(15, "late"), (9, "early")] {
            store
                .create_appointment(NewAppointment {
                    lead_name: who.into(),
                    service: "Limpeza de Pele".into(),
                    professional: "Jacilene".into(),
                    date_time: day.and_hms_opt(hour, 0, 0).unwrap(),
                })
                .await
                .unwrap();
        }
        let list = store.list_appointments().await.unwrap();
        assert_eq!(list[0].lead_name, "early");
    }

    #[tokio::test]
    async fn update_status_of_missing_lead_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_lead_status(42, LeadStatus::Sold)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn history_round_trip_and_corruption() {
        let store = MemoryStore::new();
        assert!(store.load_history("s").await.unwrap().is_none());

        store
            .save_history("s", &[Turn::user("oi")])
            .await
            .unwrap();
        let turns = store.load_history("s").await.unwrap().unwrap();
        assert_eq!(turns.len(), 1);

        store.put_raw_history("s", "{not json").await;
        let err = store.load_history("s").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));

        store.delete_history("s").await.unwrap();
        assert!(!store.has_history("s").await);
    }
}

//! libSQL backend: async `CrmStore` and `HistoryStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::agent::turn::Turn;
use crate::crm::{Appointment, Lead, LeadId, LeadStatus, NewAppointment, NewLead, PriceCatalog};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{CrmStore, HistoryStore};

/// Storage format of appointment times (studio-local, no offset).
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Write raw text into a session's stored history.
    #[cfg(test)]
    async fn put_raw_history(&self, session_id: &str, raw: &str) {
        self.conn()
            .execute(
                "INSERT INTO conversation_history (session_id, turns, turn_count, updated_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![session_id, raw, Utc::now().to_rfc3339()],
            )
            .await
            .unwrap();
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_decimal(s: &str, column: &str) -> Result<Decimal, DatabaseError> {
    Decimal::from_str(s.trim())
        .map_err(|e| DatabaseError::Serialization(format!("{column} {s:?}: {e}")))
}

fn parse_date_time(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .map_err(|e| DatabaseError::Serialization(format!("appointment date_time {s:?}: {e}")))
}

/// Map a row to a Lead.
///
/// Column order: 0:id, 1:name, 2:whatsapp, 3:origin, 4:status, 5:value, 6:last_contact
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("lead row: {e}"));
    let status_str: String = row.get(4).map_err(read)?;
    let value_str: String = row.get(5).map_err(read)?;
    Ok(Lead {
        id: row.get(0).map_err(read)?,
        name: row.get(1).map_err(read)?,
        whatsapp: row.get(2).map_err(read)?,
        origin: row.get(3).map_err(read)?,
        status: status_str
            .parse::<LeadStatus>()
            .map_err(|e: String| DatabaseError::Serialization(format!("lead status: {e}")))?,
        value: parse_decimal(&value_str, "lead value")?,
        last_contact: row.get(6).map_err(read)?,
    })
}

/// Column order: 0:id, 1:lead_name, 2:service, 3:professional, 4:date_time
fn row_to_appointment(row: &libsql::Row) -> Result<Appointment, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("appointment row: {e}"));
    let date_time: String = row.get(4).map_err(read)?;
    Ok(Appointment {
        id: row.get(0).map_err(read)?,
        lead_name: row.get(1).map_err(read)?,
        service: row.get(2).map_err(read)?,
        professional: row.get(3).map_err(read)?,
        date_time: parse_date_time(&date_time)?,
    })
}

/// Read the single `id` column produced by `INSERT ... RETURNING id`.
async fn returned_id(mut rows: libsql::Rows, what: &str) -> Result<i64, DatabaseError> {
    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{what}: {e}")))?
        .ok_or_else(|| DatabaseError::Query(format!("{what}: no id returned")))?;
    row.get(0)
        .map_err(|e| DatabaseError::Query(format!("{what}: {e}")))
}

#[async_trait]
impl CrmStore for LibSqlBackend {
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "INSERT INTO leads (name, whatsapp, origin, status, value, last_contact)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                params![
                    lead.name.as_str(),
                    lead.whatsapp.as_str(),
                    lead.origin.as_str(),
                    lead.status.label(),
                    lead.value.to_string(),
                    lead.last_contact.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_lead: {e}")))?;
        let id = returned_id(rows, "create_lead").await?;
        debug!(lead_id = id, "Lead inserted");
        Ok(lead.into_lead(id))
    }

    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Appointment, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "INSERT INTO appointments (lead_name, service, professional, date_time)
                 VALUES (?1, ?2, ?3, ?4) RETURNING id",
                params![
                    appointment.lead_name.as_str(),
                    appointment.service.as_str(),
                    appointment.professional.as_str(),
                    appointment.date_time.format(DATE_TIME_FORMAT).to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_appointment: {e}")))?;
        let id = returned_id(rows, "create_appointment").await?;
        debug!(appointment_id = id, "Appointment inserted");
        Ok(appointment.into_appointment(id))
    }

    async fn price_catalog(&self) -> Result<PriceCatalog, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT name, price FROM services ORDER BY position ASC", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("price_catalog: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("price_catalog: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("price_catalog: {e}")))?;
            let price: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("price_catalog: {e}")))?;
            entries.push((name, parse_decimal(&price, "service price")?));
        }
        Ok(PriceCatalog::new(entries))
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, whatsapp, origin, status, value, last_contact
                 FROM leads ORDER BY id DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads: {e}")))?
        {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, lead_name, service, professional, date_time
                 FROM appointments ORDER BY date_time ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_appointments: {e}")))?;

        let mut appointments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_appointments: {e}")))?
        {
            appointments.push(row_to_appointment(&row)?);
        }
        Ok(appointments)
    }

    async fn update_lead_status(
        &self,
        id: LeadId,
        status: LeadStatus,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?2 WHERE id = ?1",
                params![id, status.label()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_lead_status: {e}")))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for LibSqlBackend {
    async fn load_history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT turns FROM conversation_history WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?
        else {
            return Ok(None);
        };

        let raw: String = row
            .get(0)
            .map_err(|e| DatabaseError::Serialization(format!("history {session_id}: {e}")))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| DatabaseError::Serialization(format!("history {session_id}: {e}")))
    }

    async fn save_history(&self, session_id: &str, turns: &[Turn]) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(turns)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO conversation_history (session_id, turns, turn_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id) DO UPDATE SET
                    turns = excluded.turns,
                    turn_count = excluded.turn_count,
                    updated_at = excluded.updated_at",
                params![
                    session_id,
                    raw,
                    turns.len() as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_history: {e}")))?;
        Ok(())
    }

    async fn delete_history(&self, session_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM conversation_history WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_history: {e}")))?;
        Ok(())
    }
}

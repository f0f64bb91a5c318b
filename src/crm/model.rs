//! CRM records created and read by the assistant.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a lead.
pub type LeadId = i64;

/// Store-assigned identifier of an appointment.
pub type AppointmentId = i64;

/// `last_contact` label stamped on leads the assistant creates.
pub const LAST_CONTACT_NOW: &str = "Agora";

/// Funnel stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "Capturados")]
    Captured,
    #[serde(rename = "Atendidos")]
    Attended,
    #[serde(rename = "Vendas Realizadas")]
    Sold,
}

impl LeadStatus {
    /// Pipeline order, left to right on the board.
    pub const FUNNEL: [LeadStatus; 3] = [Self::Captured, Self::Attended, Self::Sold];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Captured => "Capturados",
            Self::Attended => "Atendidos",
            Self::Sold => "Vendas Realizadas",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::FUNNEL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown lead status: {s}"))
    }
}

/// A sales contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub whatsapp: String,
    pub origin: String,
    pub status: LeadStatus,
    pub value: Decimal,
    pub last_contact: String,
}

/// Fields for a lead that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub name: String,
    pub whatsapp: String,
    pub origin: String,
    pub status: LeadStatus,
    pub value: Decimal,
    pub last_contact: String,
}

impl NewLead {
    /// A lead captured during a conversation: stage Captured, no deal value yet.
    pub fn captured(
        name: impl Into<String>,
        whatsapp: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            whatsapp: whatsapp.into(),
            origin: origin.into(),
            status: LeadStatus::Captured,
            value: Decimal::ZERO,
            last_contact: LAST_CONTACT_NOW.to_string(),
        }
    }

    pub fn into_lead(self, id: LeadId) -> Lead {
        Lead {
            id,
            name: self.name,
            whatsapp: self.whatsapp,
            origin: self.origin,
            status: self.status,
            value: self.value,
            last_contact: self.last_contact,
        }
    }
}

/// A booked service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub lead_name: String,
    pub service: String,
    pub professional: String,
    /// Studio-local wall-clock time.
    pub date_time: NaiveDateTime,
}

/// Fields for an appointment that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub lead_name: String,
    pub service: String,
    pub professional: String,
    pub date_time: NaiveDateTime,
}

impl NewAppointment {
    pub fn into_appointment(self, id: AppointmentId) -> Appointment {
        Appointment {
            id,
            lead_name: self.lead_name,
            service: self.service,
            professional: self.professional,
            date_time: self.date_time,
        }
    }
}

/// Service name → price in BRL, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceCatalog {
    entries: Vec<(String, Decimal)>,
}

impl PriceCatalog {
    pub fn new(entries: Vec<(String, Decimal)>) -> Self {
        Self { entries }
    }

    /// The studio's published services.
    pub fn studio_default() -> Self {
        Self::new(vec![
            ("Micropigmentação".to_string(), dec!(500)),
            ("Design de Sobrancelhas".to_string(), dec!(80)),
            ("Micropigmentação Labial".to_string(), dec!(450)),
            ("Limpeza de Pele".to_string(), dec!(150)),
        ])
    }

    /// Case-insensitive lookup; returns the catalog's own spelling of the service.
    pub fn lookup(&self, service: &str) -> Option<(&str, Decimal)> {
        let wanted = service.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(name, price)| (name.as_str(), *price))
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Digits-only form of a WhatsApp number, used as the dedup key.
pub fn normalize_whatsapp(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

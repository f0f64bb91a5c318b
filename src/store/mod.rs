//! Persistence layer: CRM records and conversation transcripts.

pub mod libsql_backend;
pub mod memory;
mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{CrmStore, HistoryStore};

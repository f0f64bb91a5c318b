//! CRM domain: leads, appointments and the service price catalog.

pub mod model;

pub use model::*;

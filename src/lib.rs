//! Convexa agent: conversational sales assistant over a CRM.

pub mod agent;
pub mod api;
pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod store;
pub mod tools;

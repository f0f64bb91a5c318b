//! Built-in CRM tools exposed to the sales assistant.

pub mod appointment;
pub mod handover;
pub mod lead;
pub mod price;

pub use appointment::CreateAppointmentTool;
pub use handover::HandoverTool;
pub use lead::CreateLeadTool;
pub use price::PriceLookupTool;

use std::sync::Arc;

use crate::error::ToolError;
use crate::store::CrmStore;
use crate::tools::ToolRegistry;

pub const CREATE_LEAD_TOOL: &str = "criar_lead";
pub const CREATE_APPOINTMENT_TOOL: &str = "criar_agendamento";
pub const PRICE_LOOKUP_TOOL: &str = "buscar_preco";
pub const HANDOVER_TOOL: &str = "handover_humano";

/// Registry holding the four CRM tools, in the order they are declared to the model.
pub fn crm_registry(store: Arc<dyn CrmStore>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CreateLeadTool::new(Arc::clone(&store))))?;
    registry.register(Arc::new(CreateAppointmentTool::new(Arc::clone(&store))))?;
    registry.register(Arc::new(PriceLookupTool::new(store)))?;
    registry.register(Arc::new(HandoverTool))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn crm_registry_declares_all_tools_in_order() {
        let registry = crm_registry(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                CREATE_LEAD_TOOL,
                CREATE_APPOINTMENT_TOOL,
                PRICE_LOOKUP_TOOL,
                HANDOVER_TOOL
            ]
        );
    }
}

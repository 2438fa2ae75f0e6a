//! Built-in CRM tools.
//!
//! Every tool is tenant-scoped through the acting user in its
//! [`ToolContext`](crate::tool::ToolContext) and works against a shared
//! [`CrmStore`].

pub mod cards;
pub mod clients;
pub mod contacts;
pub mod store;

use std::sync::Arc;

use uuid::Uuid;

use crate::registry::{RegistryError, ToolRegistry};
use crate::tool::ToolError;

pub use cards::{CreateCardTool, DeleteCardTool, GetAllCardsTool};
pub use clients::SearchClientsTool;
pub use contacts::{CreateContactTool, DeleteContactTool, SearchContactsTool};
pub use store::{CrmStore, InMemoryStore};

/// Register the full CRM tool set in advertisement order.
pub fn register_crm_tools(
    registry: &mut ToolRegistry,
    store: Arc<dyn CrmStore>,
) -> Result<(), RegistryError> {
    registry.register(SearchClientsTool::new(store.clone()))?;
    registry.register(SearchContactsTool::new(store.clone()))?;
    registry.register(GetAllCardsTool::new(store.clone()))?;
    registry.register(CreateContactTool::new(store.clone()))?;
    registry.register(DeleteContactTool::new(store.clone()))?;
    registry.register(CreateCardTool::new(store.clone()))?;
    registry.register(DeleteCardTool::new(store))?;
    Ok(())
}

pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ToolError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ToolError::InvalidInput(format!("{field} must be a UUID, got '{raw}'")))
}

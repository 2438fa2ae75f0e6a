use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::store::CrmStore;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};

const SEARCH_LIMIT: usize = 10;

/// Find client organisations by company name or email.
pub struct SearchClientsTool {
    store: Arc<dyn CrmStore>,
}

impl SearchClientsTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct SearchClientsInput {
    query: String,
}

#[async_trait]
impl Tool for SearchClientsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "searchClients".to_string(),
            description: "Search for clients by name, email, or other criteria. Use this when you need to find a client UUID.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search term (company name, email, etc.)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: SearchClientsInput = parse_input(input)?;
        let tenant = &context.actor.tenant_id;

        let clients = self
            .store
            .search_clients(tenant, &params.query, SEARCH_LIMIT)
            .await?;
        debug!(tenant = %tenant, query = %params.query, count = clients.len(), "searchClients");

        let rows: Vec<Value> = clients
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "companyName": c.company_name,
                    "email": c.email,
                    "phone": c.phone,
                })
            })
            .collect();
        let message = format!("Found {} client(s) matching '{}'", rows.len(), params.query);
        Ok(ToolOutput::new(json!({ "clients": rows, "count": rows.len() })).with_message(message))
    }
}

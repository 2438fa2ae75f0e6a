use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use crm_core::Contact;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::parse_id;
use super::store::CrmStore;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};

const SEARCH_LIMIT: usize = 10;

fn contact_json(contact: &Contact, client_name: Option<&str>) -> Value {
    json!({
        "id": contact.id,
        "name": contact.full_name(),
        "firstName": contact.first_name,
        "lastName": contact.last_name,
        "email": contact.email,
        "phone": contact.phone,
        "title": contact.title,
        "client": {
            "id": contact.client_id,
            "name": client_name,
        },
    })
}

/// Find individual people by name, email or title.
pub struct SearchContactsTool {
    store: Arc<dyn CrmStore>,
}

impl SearchContactsTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchContactsInput {
    query: String,
    client_id: Option<String>,
}

#[async_trait]
impl Tool for SearchContactsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "searchContacts".to_string(),
            description: "Search for individual contacts by name, email, title, or other criteria.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search term (first name, last name, email, title, etc.)"
                    },
                    "clientId": {
                        "type": "string",
                        "description": "Optional: filter by specific client UUID"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: SearchContactsInput = parse_input(input)?;
        let tenant = &context.actor.tenant_id;
        let client_id = params
            .client_id
            .as_deref()
            .map(|raw| parse_id("clientId", raw))
            .transpose()?;

        let contacts = self
            .store
            .search_contacts(tenant, &params.query, client_id, SEARCH_LIMIT)
            .await?;

        let mut rows = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            let client = self.store.get_client(tenant, contact.client_id).await?;
            rows.push(contact_json(contact, client.as_ref().map(|c| c.company_name.as_str())));
        }
        debug!(tenant = %tenant, query = %params.query, count = rows.len(), "searchContacts");

        let message = format!("Found {} contact(s) matching '{}'", rows.len(), params.query);
        Ok(ToolOutput::new(json!({ "contacts": rows, "count": rows.len() })).with_message(message))
    }
}

/// Create a contact under an existing client.
pub struct CreateContactTool {
    store: Arc<dyn CrmStore>,
}

impl CreateContactTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateContactInput {
    client_id: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    title: Option<String>,
}

/// Empty strings from the model mean "not provided".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl Tool for CreateContactTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "createContact".to_string(),
            description: "Create a new contact for a client. You MUST have the client UUID - use searchClients first if you only have a company name.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clientId": { "type": "string", "description": "Client UUID to associate contact with" },
                    "firstName": { "type": "string", "description": "Contact first name" },
                    "lastName": { "type": "string", "description": "Contact last name" },
                    "email": { "type": "string", "description": "Contact email address" },
                    "phone": { "type": "string", "description": "Office phone number" },
                    "title": { "type": "string", "description": "Job title" }
                },
                "required": ["clientId", "firstName", "lastName"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: CreateContactInput = parse_input(input)?;
        let tenant = &context.actor.tenant_id;
        let client_id = parse_id("clientId", &params.client_id)?;

        let client = self
            .store
            .get_client(tenant, client_id)
            .await?
            .ok_or_else(|| ToolError::NotFound("Client not found or access denied".to_string()))?;

        let contact = self
            .store
            .insert_contact(Contact {
                id: Uuid::new_v4(),
                tenant_id: tenant.clone(),
                client_id,
                first_name: params.first_name.trim().to_string(),
                last_name: params.last_name.trim().to_string(),
                email: non_empty(params.email),
                phone: non_empty(params.phone),
                title: non_empty(params.title),
                created_at: Utc::now(),
            })
            .await?;
        info!(tenant = %tenant, contact_id = %contact.id, client = %client.company_name, "created contact");

        let message = format!("Created contact {} for {}", contact.full_name(), client.company_name);
        Ok(ToolOutput::new(json!({
            "contact": contact_json(&contact, Some(&client.company_name)),
        }))
        .with_message(message))
    }
}

/// Delete a contact by id.
pub struct DeleteContactTool {
    store: Arc<dyn CrmStore>,
}

impl DeleteContactTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteContactInput {
    contact_id: String,
}

#[async_trait]
impl Tool for DeleteContactTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "deleteContact".to_string(),
            description: "Delete a contact from the system.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "contactId": { "type": "string", "description": "Contact UUID to delete" }
                },
                "required": ["contactId"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: DeleteContactInput = parse_input(input)?;
        let tenant = &context.actor.tenant_id;
        let contact_id = parse_id("contactId", &params.contact_id)?;

        let deleted = self
            .store
            .delete_contact(tenant, contact_id)
            .await?
            .ok_or_else(|| ToolError::NotFound("Contact not found".to_string()))?;
        info!(tenant = %tenant, contact_id = %deleted.id, "deleted contact");

        Ok(ToolOutput::new(json!({
            "deleted": {
                "id": deleted.id,
                "name": deleted.full_name(),
                "email": deleted.email,
            }
        }))
        .with_message(format!("Deleted contact {}", deleted.full_name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{context, store};

    #[tokio::test]
    async fn test_create_then_search_contact() {
        let store = store();
        let client = store.add_client("t1", "Acme Lending", None).await;

        let create = CreateContactTool::new(store.clone());
        let out = create
            .execute(
                json!({
                    "clientId": client.id.to_string(),
                    "firstName": "Dana",
                    "lastName": "Reyes",
                    "email": "dana@acme.com",
                    "title": ""
                }),
                &context("t1"),
            )
            .await
            .unwrap();
        assert_eq!(out.data["contact"]["name"], "Dana Reyes");
        assert_eq!(out.data["contact"]["title"], Value::Null);
        assert_eq!(out.message.as_deref(), Some("Created contact Dana Reyes for Acme Lending"));

        let search = SearchContactsTool::new(store);
        let found = search
            .execute(json!({"query": "dana"}), &context("t1"))
            .await
            .unwrap();
        assert_eq!(found.data["count"], 1);
        assert_eq!(found.data["contacts"][0]["client"]["name"], "Acme Lending");
    }

    #[tokio::test]
    async fn test_create_contact_for_unknown_client() {
        let tool = CreateContactTool::new(store());
        let err = tool
            .execute(
                json!({
                    "clientId": Uuid::new_v4().to_string(),
                    "firstName": "A",
                    "lastName": "B"
                }),
                &context("t1"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Client not found or access denied");
    }

    #[tokio::test]
    async fn test_create_contact_in_foreign_tenant_is_denied() {
        let store = store();
        let client = store.add_client("t1", "Acme", None).await;
        let tool = CreateContactTool::new(store);
        let err = tool
            .execute(
                json!({"clientId": client.id.to_string(), "firstName": "A", "lastName": "B"}),
                &context("t2"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_contact_twice() {
        let store = store();
        let client = store.add_client("t1", "Acme", None).await;
        let created = CreateContactTool::new(store.clone())
            .execute(
                json!({"clientId": client.id.to_string(), "firstName": "Jo", "lastName": "Park"}),
                &context("t1"),
            )
            .await
            .unwrap();
        let id = created.data["contact"]["id"].as_str().unwrap().to_string();

        let delete = DeleteContactTool::new(store);
        let out = delete
            .execute(json!({"contactId": id}), &context("t1"))
            .await
            .unwrap();
        assert_eq!(out.data["deleted"]["name"], "Jo Park");

        let err = delete
            .execute(json!({"contactId": id}), &context("t1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Contact not found");
    }

    #[tokio::test]
    async fn test_search_contacts_rejects_bad_client_id() {
        let tool = SearchContactsTool::new(store());
        let err = tool
            .execute(json!({"query": "x", "clientId": "acme"}), &context("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}

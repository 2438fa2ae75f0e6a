//! Kanban card tools: list, create and delete action cards.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use crm_core::{Card, CardState, CardType, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::parse_id;
use super::store::CrmStore;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};

const DEFAULT_CARD_LIMIT: usize = 50;
const CARD_TYPES: [&str; 5] = ["send_email", "create_task", "create_deal", "follow_up", "research"];

fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

/// Every card of the tenant, newest first.
pub struct GetAllCardsTool {
    store: Arc<dyn CrmStore>,
}

impl GetAllCardsTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetAllCardsInput {
    #[serde(default)]
    include_completed: bool,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for GetAllCardsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "getAllCards".to_string(),
            description: "Get all current Kanban cards across all states. Use this to see the complete state of the Kanban board.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "includeCompleted": {
                        "type": "boolean",
                        "description": "Include completed and rejected cards (default: false)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of cards to return (default: 50)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: GetAllCardsInput = parse_input(input)?;
        let tenant = &context.actor.tenant_id;
        let limit = params.limit.unwrap_or(DEFAULT_CARD_LIMIT);

        let cards = self
            .store
            .list_cards(tenant, params.include_completed, limit)
            .await?;

        let mut rows = Vec::with_capacity(cards.len());
        for card in &cards {
            let client = match card.client_id {
                Some(id) => self.store.get_client(tenant, id).await?,
                None => None,
            };
            rows.push(json!({
                "id": card.id,
                "title": card.title,
                "type": card.card_type,
                "state": card.state,
                "priority": card.priority,
                "rationale": card.rationale,
                "createdAt": card.created_at,
                "client": client.map(|c| c.company_name),
                "clientId": card.client_id,
            }));
        }
        debug!(tenant = %tenant, count = rows.len(), include_completed = params.include_completed, "getAllCards");

        let message = format!("Found {} card(s)", rows.len());
        Ok(ToolOutput::new(json!({ "cards": rows, "count": rows.len() })).with_message(message))
    }
}

/// Suggest a new action card. Cards always start in `suggested`.
pub struct CreateCardTool {
    store: Arc<dyn CrmStore>,
}

impl CreateCardTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailDraft {
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
}

impl EmailDraft {
    fn validate(&self) -> Result<(), ToolError> {
        if !self.to.as_deref().is_some_and(|to| to.contains('@')) {
            return Err(ToolError::InvalidInput(
                "Email must include a valid to address".to_string(),
            ));
        }
        if self.subject.as_deref().map_or(0, |s| s.chars().count()) < 5 {
            return Err(ToolError::InvalidInput(
                "Email subject must be at least 5 characters".to_string(),
            ));
        }
        if self.body.as_deref().map_or(0, |b| b.chars().count()) < 20 {
            return Err(ToolError::InvalidInput(
                "Email body must be at least 20 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCardInput {
    #[serde(rename = "type")]
    card_type: CardType,
    client_id: Option<String>,
    title: String,
    rationale: String,
    priority: Option<Priority>,
    email_draft: Option<EmailDraft>,
    task_details: Option<Value>,
}

#[async_trait]
impl Tool for CreateCardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "createCard".to_string(),
            description: "Create a new action card on the Kanban board. For send_email type, MUST include emailDraft with to, subject, and body.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": CARD_TYPES, "description": "Type of action" },
                    "clientId": { "type": "string", "description": "UUID of the client (optional for general strategic cards)" },
                    "title": { "type": "string", "description": "Brief title for the action" },
                    "rationale": { "type": "string", "description": "Why this action is recommended (business reasoning)" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"], "description": "Priority level" },
                    "emailDraft": {
                        "type": "object",
                        "description": "REQUIRED for send_email type",
                        "properties": {
                            "to": { "type": "string", "description": "Recipient email address" },
                            "subject": { "type": "string", "description": "Email subject line" },
                            "body": { "type": "string", "description": "Complete email body" },
                            "replyTo": { "type": "string", "description": "Reply-to email address" }
                        }
                    },
                    "taskDetails": {
                        "type": "object",
                        "description": "Details for task type cards",
                        "properties": {
                            "description": { "type": "string" },
                            "dueDate": { "type": "string" }
                        }
                    }
                },
                "required": ["type", "title", "rationale"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: CreateCardInput = parse_input(input)?;
        let actor = &context.actor;

        if params.card_type == CardType::SendEmail {
            let draft = params.email_draft.as_ref().ok_or_else(|| {
                ToolError::InvalidInput(
                    "send_email actions must include emailDraft with subject, body, and to fields"
                        .to_string(),
                )
            })?;
            draft.validate()?;
        }

        let client_id = params
            .client_id
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_id("clientId", raw))
            .transpose()?;

        let action_payload = match (&params.email_draft, params.task_details) {
            (Some(draft), _) => serde_json::to_value(draft)
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
            (None, Some(details)) => details,
            (None, None) => json!({}),
        };

        let card = self
            .store
            .insert_card(Card {
                id: Uuid::new_v4(),
                tenant_id: actor.tenant_id.clone(),
                client_id,
                card_type: params.card_type,
                state: CardState::Suggested,
                priority: params.priority.unwrap_or_default(),
                title: params.title,
                rationale: params.rationale,
                action_payload,
                created_by: actor.actor_id.clone(),
                created_at: Utc::now(),
            })
            .await?;
        info!(tenant = %card.tenant_id, card_id = %card.id, card_type = %wire_name(&card.card_type), "created card");

        let message = format!("Created {} card: {}", wire_name(&card.card_type), card.title);
        Ok(ToolOutput::new(json!({
            "card": {
                "id": card.id,
                "title": card.title,
                "type": card.card_type,
                "state": card.state,
            }
        }))
        .with_message(message))
    }
}

/// Delete cards matching every supplied criterion.
pub struct DeleteCardTool {
    store: Arc<dyn CrmStore>,
}

impl DeleteCardTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCardInput {
    card_id: Option<String>,
    priority: Option<Priority>,
    #[serde(rename = "type")]
    card_type: Option<CardType>,
    title_match: Option<String>,
    client_id: Option<String>,
}

impl DeleteCardInput {
    fn has_criteria(&self) -> bool {
        self.card_id.is_some()
            || self.priority.is_some()
            || self.card_type.is_some()
            || self.title_match.is_some()
            || self.client_id.is_some()
    }
}

#[async_trait]
impl Tool for DeleteCardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "deleteCard".to_string(),
            description: "Delete one or more action cards from the Kanban board. Can match by ID, priority, type, or title.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cardId": { "type": "string", "description": "Specific card UUID to delete" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"], "description": "Delete all cards with this priority" },
                    "type": { "type": "string", "enum": CARD_TYPES, "description": "Delete all cards of this type" },
                    "titleMatch": { "type": "string", "description": "Delete cards with titles containing this text" },
                    "clientId": { "type": "string", "description": "Delete cards associated with this client" }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: DeleteCardInput = parse_input(input)?;
        if !params.has_criteria() {
            return Err(ToolError::InvalidInput(
                "Provide at least one of cardId, priority, type, titleMatch or clientId".to_string(),
            ));
        }
        let tenant = &context.actor.tenant_id;
        let card_id = params.card_id.as_deref().map(|raw| parse_id("cardId", raw)).transpose()?;
        let client_id = params
            .client_id
            .as_deref()
            .map(|raw| parse_id("clientId", raw))
            .transpose()?;
        let title_match = params.title_match.as_deref().map(str::to_lowercase);

        let cards = self.store.list_cards(tenant, true, usize::MAX).await?;
        let matched: Vec<&Card> = cards
            .iter()
            .filter(|c| card_id.map_or(true, |id| c.id == id))
            .filter(|c| params.priority.map_or(true, |p| c.priority == p))
            .filter(|c| params.card_type.map_or(true, |t| c.card_type == t))
            .filter(|c| {
                title_match
                    .as_deref()
                    .map_or(true, |needle| c.title.to_lowercase().contains(needle))
            })
            .filter(|c| client_id.map_or(true, |id| c.client_id == Some(id)))
            .collect();

        if matched.is_empty() {
            return Ok(ToolOutput::new(json!({ "deletedCount": 0, "deletedCards": [] }))
                .with_message("No cards matched the criteria"));
        }

        let ids: Vec<Uuid> = matched.iter().map(|c| c.id).collect();
        let deleted = self.store.delete_cards(tenant, &ids).await?;
        info!(tenant = %tenant, deleted, "deleted cards");

        let summary: Vec<Value> = matched
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "title": c.title,
                    "type": c.card_type,
                    "priority": c.priority,
                })
            })
            .collect();
        Ok(ToolOutput::new(json!({ "deletedCount": deleted, "deletedCards": summary }))
            .with_message(format!("Deleted {} card(s)", deleted)))
    }
}

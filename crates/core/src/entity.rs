use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TenantId = String;
pub type RecordId = Uuid;

/// A client organisation (lender, AMC, law firm, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub company_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An individual person attached to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub client_id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    SendEmail,
    CreateTask,
    CreateDeal,
    FollowUp,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    Suggested,
    InReview,
    Approved,
    Executing,
    Completed,
    Rejected,
}

impl CardState {
    /// Completed and rejected cards are hidden from the board by default.
    pub fn is_closed(self) -> bool {
        matches!(self, CardState::Completed | CardState::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// An action card on the agent's Kanban board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub client_id: Option<RecordId>,
    pub card_type: CardType,
    pub state: CardState,
    pub priority: Priority,
    pub title: String,
    pub rationale: String,
    /// Type-specific payload (email draft, task details).
    #[serde(default)]
    pub action_payload: serde_json::Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardState::Suggested => write!(f, "suggested"),
            CardState::InReview => write!(f, "in_review"),
            CardState::Approved => write!(f, "approved"),
            CardState::Executing => write!(f, "executing"),
            CardState::Completed => write!(f, "completed"),
            CardState::Rejected => write!(f, "rejected"),
        }
    }
}

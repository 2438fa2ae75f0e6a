//! Tenant-scoped data store the CRM tools read and write.

use async_trait::async_trait;
use chrono::Utc;
use crm_core::{Card, Client, Contact, CrmError, RecordId};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Every method is scoped to one tenant; records of other tenants are
/// invisible to it.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Clients whose name or email contains `query`, case-insensitively.
    async fn search_clients(
        &self,
        tenant_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Client>, CrmError>;

    async fn get_client(&self, tenant_id: &str, id: RecordId) -> Result<Option<Client>, CrmError>;

    async fn insert_client(&self, client: Client) -> Result<Client, CrmError>;

    /// Contacts matching `query` on name, email or title.
    async fn search_contacts(
        &self,
        tenant_id: &str,
        query: &str,
        client_id: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Contact>, CrmError>;

    async fn insert_contact(&self, contact: Contact) -> Result<Contact, CrmError>;

    /// Remove a contact, returning it if it existed.
    async fn delete_contact(&self, tenant_id: &str, id: RecordId)
        -> Result<Option<Contact>, CrmError>;

    /// Cards newest first. Closed cards only when `include_closed`.
    async fn list_cards(
        &self,
        tenant_id: &str,
        include_closed: bool,
        limit: usize,
    ) -> Result<Vec<Card>, CrmError>;

    async fn insert_card(&self, card: Card) -> Result<Card, CrmError>;

    /// Delete the given cards. Returns how many were removed.
    async fn delete_cards(&self, tenant_id: &str, ids: &[RecordId]) -> Result<usize, CrmError>;
}

#[derive(Debug, Default)]
struct Tables {
    clients: Vec<Client>,
    contacts: Vec<Contact>,
    cards: Vec<Card>,
}

/// Process-local store used by tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

fn contains_ci(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(needle))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for seeding: create a client with a fresh id.
    pub async fn add_client(
        &self,
        tenant_id: &str,
        company_name: &str,
        email: Option<&str>,
    ) -> Client {
        let client = Client {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            company_name: company_name.to_string(),
            email: email.map(String::from),
            phone: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.clients.push(client.clone());
        client
    }
}

#[async_trait]
impl CrmStore for InMemoryStore {
    async fn search_clients(
        &self,
        tenant_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Client>, CrmError> {
        let needle = query.trim().to_lowercase();
        let tables = self.tables.read().await;
        let found: Vec<Client> = tables
            .clients
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| {
                contains_ci(Some(&c.company_name), &needle) || contains_ci(c.email.as_deref(), &needle)
            })
            .take(limit)
            .cloned()
            .collect();
        debug!(tenant_id, query, count = found.len(), "searched clients");
        Ok(found)
    }

    async fn get_client(&self, tenant_id: &str, id: RecordId) -> Result<Option<Client>, CrmError> {
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .iter()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_client(&self, client: Client) -> Result<Client, CrmError> {
        let mut tables = self.tables.write().await;
        if tables.clients.iter().any(|c| c.id == client.id) {
            return Err(CrmError::Validation(format!("client {} already exists", client.id)));
        }
        tables.clients.push(client.clone());
        Ok(client)
    }

    async fn search_contacts(
        &self,
        tenant_id: &str,
        query: &str,
        client_id: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Contact>, CrmError> {
        let needle = query.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| client_id.map_or(true, |id| c.client_id == id))
            .filter(|c| {
                contains_ci(Some(&c.first_name), &needle)
                    || contains_ci(Some(&c.last_name), &needle)
                    || contains_ci(c.email.as_deref(), &needle)
                    || contains_ci(c.title.as_deref(), &needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact, CrmError> {
        let mut tables = self.tables.write().await;
        let owner = tables
            .clients
            .iter()
            .find(|c| c.id == contact.client_id)
            .ok_or_else(|| CrmError::not_found("Client", contact.client_id.to_string()))?;
        if owner.tenant_id != contact.tenant_id {
            return Err(CrmError::TenantMismatch(format!("client {}", owner.id)));
        }
        tables.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn delete_contact(
        &self,
        tenant_id: &str,
        id: RecordId,
    ) -> Result<Option<Contact>, CrmError> {
        let mut tables = self.tables.write().await;
        let pos = tables
            .contacts
            .iter()
            .position(|c| c.id == id && c.tenant_id == tenant_id);
        Ok(pos.map(|i| tables.contacts.remove(i)))
    }

    async fn list_cards(
        &self,
        tenant_id: &str,
        include_closed: bool,
        limit: usize,
    ) -> Result<Vec<Card>, CrmError> {
        let tables = self.tables.read().await;
        let mut cards: Vec<Card> = tables
            .cards
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| include_closed || !c.state.is_closed())
            .cloned()
            .collect();
        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cards.truncate(limit);
        Ok(cards)
    }

    async fn insert_card(&self, card: Card) -> Result<Card, CrmError> {
        let mut tables = self.tables.write().await;
        if let Some(client_id) = card.client_id {
            let owner = tables
                .clients
                .iter()
                .find(|c| c.id == client_id)
                .ok_or_else(|| CrmError::not_found("Client", client_id.to_string()))?;
            if owner.tenant_id != card.tenant_id {
                return Err(CrmError::TenantMismatch(format!("client {}", client_id)));
            }
        }
        tables.cards.push(card.clone());
        Ok(card)
    }

    async fn delete_cards(&self, tenant_id: &str, ids: &[RecordId]) -> Result<usize, CrmError> {
        let mut tables = self.tables.write().await;
        let before = tables.cards.len();
        tables
            .cards
            .retain(|c| !(c.tenant_id == tenant_id && ids.contains(&c.id)));
        Ok(before - tables.cards.len())
    }
}

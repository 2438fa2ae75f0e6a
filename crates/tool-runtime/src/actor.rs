//! Acting-user identity and the authentication gate in front of the loop.
//!
//! Authentication itself lives outside this crate. The drivers only accept a
//! resolved [`Actor`], and [`authorize`] is the single place where a caller
//! credential is turned into one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crm_core::TenantId;

/// The authenticated user a conversation runs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: String,
    pub tenant_id: TenantId,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(actor_id: impl Into<String>, tenant_id: impl Into<TenantId>) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id: tenant_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Label used in prompts and logs: email when known, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.actor_id)
    }
}

/// What the identity backend knows about a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    /// Users without a tenant assignment may not use the agent.
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("User {0} has no tenant_id assigned")]
    NoTenant(String),
}

/// Resolves a caller credential (session token, API key) to an identity.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    /// `Ok(None)` means the credential is not recognised.
    async fn resolve(&self, credential: &str) -> Result<Option<Identity>, AuthError>;
}

/// Gate every conversation passes before the first model call.
pub async fn authorize(
    resolver: &dyn ActorResolver,
    credential: &str,
) -> Result<Actor, AuthError> {
    let identity = resolver.resolve(credential).await?.ok_or_else(|| {
        warn!("rejecting conversation: credential not recognised");
        AuthError::Unauthenticated
    })?;

    let tenant_id = identity.tenant_id.ok_or_else(|| {
        warn!(user = %identity.user_id, "rejecting conversation: no tenant");
        AuthError::NoTenant(identity.user_id.clone())
    })?;

    debug!(user = %identity.user_id, tenant = %tenant_id, "actor resolved");
    Ok(Actor {
        actor_id: identity.user_id,
        tenant_id,
        email: identity.email,
    })
}

/// Fixed credential → identity table. Used by the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticActorResolver {
    identities: HashMap<String, Identity>,
}

impl StaticActorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, credential: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(credential.into(), identity);
        self
    }
}

#[async_trait]
impl ActorResolver for StaticActorResolver {
    async fn resolve(&self, credential: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.identities.get(credential).cloned())
    }
}

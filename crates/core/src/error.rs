use thiserror::Error;

/// Failures raised by the tenant data store behind the CRM tools.
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Tenant mismatch for {0}")]
    TenantMismatch(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CrmError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CrmError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

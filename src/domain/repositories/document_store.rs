use crate::domain::entities::account::AccountDocument;
use crate::domain::entities::plan::PlanLimits;
use async_trait::async_trait;

/// Error from a persistence backend, kept opaque to the domain
#[derive(Debug, thiserror::Error, Clone)]
#[error("Store error: {0}")]
pub struct StoreError(pub String);

/// Read/write access to the persisted per-account document
#[async_trait]
pub trait AccountDocumentStore: Send + Sync {
    async fn load(&self, account_id: &str) -> Result<Option<AccountDocument>, StoreError>;

    async fn save(&self, account_id: &str, document: &AccountDocument) -> Result<(), StoreError>;
}

/// Subscription lookup by user id
///
/// `Ok(None)` means the user has no subscription at all.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn find_plan(&self, user_id: &str) -> Result<Option<PlanLimits>, StoreError>;
}

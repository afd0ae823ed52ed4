//! Database Repository
//!
//! SQLite implementations of the document store and plan source.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::account::AccountDocument;
use crate::domain::entities::plan::PlanLimits;
use crate::domain::repositories::document_store::{AccountDocumentStore, PlanSource, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        StoreError(e.to_string())
    }
}

/// Per-account JSON documents
pub struct DocumentRepository {
    pool: DbPool,
}

impl DocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, account_id: &str) -> Result<Option<AccountDocument>, DatabaseError> {
        let record = sqlx::query_as::<_, AccountDocumentRecord>(
            "SELECT * FROM account_documents WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load document for {}: {}", account_id, e);
            DatabaseError::QueryError(format!("Failed to load document: {}", e))
        })?;

        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record.document)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, account_id: &str, document: &AccountDocument) -> Result<(), DatabaseError> {
        let body = serde_json::to_string(document)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO account_documents (account_id, document, last_sync, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(account_id) DO UPDATE SET
                document = excluded.document,
                last_sync = excluded.last_sync,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account_id)
        .bind(&body)
        .bind(document.sync_metadata.last_sync)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save document for {}: {}", account_id, e);
            DatabaseError::QueryError(format!("Failed to save document: {}", e))
        })?;

        debug!(
            account_id,
            positions = document.positions.len(),
            "Saved account document"
        );
        Ok(())
    }

    pub async fn delete(&self, account_id: &str) -> Result<bool, DatabaseError> {
        let rows_affected = sqlx::query("DELETE FROM account_documents WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to delete document: {}", e)))?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl AccountDocumentStore for DocumentRepository {
    async fn load(&self, account_id: &str) -> Result<Option<AccountDocument>, StoreError> {
        Ok(self.get(account_id).await?)
    }

    async fn save(&self, account_id: &str, document: &AccountDocument) -> Result<(), StoreError> {
        Ok(self.upsert(account_id, document).await?)
    }
}

/// User subscriptions
pub struct SubscriptionRepository {
    pool: DbPool,
}

impl SubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>, DatabaseError> {
        sqlx::query_as::<_, SubscriptionRecord>("SELECT * FROM subscriptions WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get subscription for {}: {}", user_id, e);
                DatabaseError::QueryError(format!("Failed to get subscription: {}", e))
            })
    }

    pub async fn upsert(&self, subscription: UpsertSubscription) -> Result<(), DatabaseError> {
        let plan = &subscription.plan;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                user_id, plan_name, max_accounts, max_strategies,
                is_active, is_banned, is_cancelled, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id) DO UPDATE SET
                plan_name = excluded.plan_name,
                max_accounts = excluded.max_accounts,
                max_strategies = excluded.max_strategies,
                is_active = excluded.is_active,
                is_banned = excluded.is_banned,
                is_cancelled = excluded.is_cancelled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&subscription.user_id)
        .bind(&plan.plan_name)
        .bind(i64::from(plan.max_accounts))
        .bind(i64::from(plan.max_strategies))
        .bind(plan.is_active)
        .bind(plan.is_banned)
        .bind(plan.is_cancelled)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save subscription for {}: {}", subscription.user_id, e);
            DatabaseError::QueryError(format!("Failed to save subscription: {}", e))
        })?;

        debug!("Saved subscription for {}", subscription.user_id);
        Ok(())
    }
}

#[async_trait]
impl PlanSource for SubscriptionRepository {
    async fn find_plan(&self, user_id: &str) -> Result<Option<PlanLimits>, StoreError> {
        Ok(self.get(user_id).await?.map(PlanLimits::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_memory_database;

    fn empty_document() -> AccountDocument {
        AccountDocument::empty(Utc::now())
    }

    #[tokio::test]
    async fn test_document_roundtrip_and_overwrite() {
        let repo = DocumentRepository::new(init_memory_database().await.unwrap());
        assert!(repo.load("acc").await.unwrap().is_none());

        let mut document = empty_document();
        repo.save("acc", &document).await.unwrap();

        document.metrics.net_pnl = 42.0;
        repo.save("acc", &document).await.unwrap();

        let loaded = repo.load("acc").await.unwrap().unwrap();
        assert_eq!(loaded.metrics.net_pnl, 42.0);
        assert!(repo.delete("acc").await.unwrap());
        assert!(repo.load("acc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO account_documents (account_id, document, last_sync) VALUES ('acc', '{oops', ?1)")
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();

        let repo = DocumentRepository::new(pool);
        assert!(repo.load("acc").await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_lookup() {
        let repo = SubscriptionRepository::new(init_memory_database().await.unwrap());
        assert_eq!(repo.find_plan("user-1").await.unwrap(), None);

        repo.upsert(UpsertSubscription {
            user_id: "user-1".into(),
            plan: PlanLimits {
                max_accounts: 5,
                max_strategies: 3,
                plan_name: "Pro".into(),
                is_active: true,
                is_banned: false,
                is_cancelled: true,
            },
        })
        .await
        .unwrap();

        let plan = repo.find_plan("user-1").await.unwrap().unwrap();
        assert_eq!(plan.plan_name, "Pro");
        assert_eq!(plan.max_accounts, 5);
        assert!(plan.is_cancelled);
    }
}

//! Database Models

use crate::domain::entities::plan::PlanLimits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of `account_documents`; `document` holds the JSON body
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountDocumentRecord {
    pub account_id: String,
    pub document: String,
    pub last_sync: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of `subscriptions`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub plan_name: String,
    pub max_accounts: i64,
    pub max_strategies: i64,
    pub is_active: bool,
    pub is_banned: bool,
    pub is_cancelled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<SubscriptionRecord> for PlanLimits {
    fn from(record: SubscriptionRecord) -> Self {
        PlanLimits {
            max_accounts: u32::try_from(record.max_accounts).unwrap_or(0),
            max_strategies: u32::try_from(record.max_strategies).unwrap_or(0),
            plan_name: record.plan_name,
            is_active: record.is_active,
            is_banned: record.is_banned,
            is_cancelled: record.is_cancelled,
        }
    }
}

/// Create or replace a subscription
#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub user_id: String,
    pub plan: PlanLimits,
}

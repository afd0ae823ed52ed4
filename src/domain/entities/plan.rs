use serde::{Deserialize, Serialize};

pub const FREE_PLAN_NAME: &str = "Free";

/// Subscription plan limits for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_accounts: u32,
    pub max_strategies: u32,
    pub plan_name: String,
    pub is_active: bool,
    pub is_banned: bool,
    pub is_cancelled: bool,
}

impl PlanLimits {
    /// Tier applied when a user has no subscription
    pub fn free() -> Self {
        Self {
            max_accounts: 1,
            max_strategies: 1,
            plan_name: FREE_PLAN_NAME.to_string(),
            is_active: true,
            is_banned: false,
            is_cancelled: false,
        }
    }

    pub fn can_add_account(&self, current_accounts: u32) -> bool {
        !self.is_banned && current_accounts < self.max_accounts
    }

    pub fn can_add_strategy(&self, current_strategies: u32) -> bool {
        !self.is_banned && current_strategies < self.max_strategies
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier_limits() {
        let plan = PlanLimits::free();
        assert_eq!(plan.max_accounts, 1);
        assert_eq!(plan.max_strategies, 1);
        assert_eq!(plan.plan_name, "Free");
        assert!(plan.can_add_account(0));
        assert!(!plan.can_add_account(1));
    }

    #[test]
    fn test_banned_user_cannot_add() {
        let plan = PlanLimits {
            max_accounts: 10,
            max_strategies: 10,
            plan_name: "Pro".into(),
            is_active: true,
            is_banned: true,
            is_cancelled: false,
        };
        assert!(!plan.can_add_account(0));
        assert!(!plan.can_add_strategy(0));
    }
}

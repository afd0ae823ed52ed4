use crate::domain::entities::account::AccountRef;
use std::time::Duration;

/// How failures that reach the dashboard are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Serve last-known-good data or zeroed defaults instead of an error
    SafeDefaults,
    /// Return the error to the caller
    Propagate,
}

impl FallbackPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "safe" | "safe_defaults" | "defaults" => Some(FallbackPolicy::SafeDefaults),
            "propagate" | "strict" => Some(FallbackPolicy::Propagate),
            _ => None,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub bind_address: String,
    pub broker_api_base: String,
    pub accounts: Vec<AccountRef>,
    pub broker_request_timeout: Duration,
    pub broker_connect_timeout: Duration,
    pub instrument_lookups_per_minute: u32,
    pub resync_threshold: chrono::Duration,
    pub plan_cache_ttl: Duration,
    pub plan_cache_capacity: usize,
    pub fallback_policy: FallbackPolicy,
    pub api_requests_per_minute: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            database_url: "sqlite://data/tradepulse.db".to_string(),
            bind_address: "127.0.0.1:3000".to_string(),
            broker_api_base: "https://live.tradelocker.com/backend-api/".to_string(),
            accounts: Vec::new(),
            broker_request_timeout: Duration::from_millis(10_000),
            broker_connect_timeout: Duration::from_millis(5_000),
            instrument_lookups_per_minute: 120, // one lookup every 500ms
            resync_threshold: chrono::Duration::hours(24),
            plan_cache_ttl: Duration::from_millis(2_000),
            plan_cache_capacity: 1_024,
            fallback_policy: FallbackPolicy::SafeDefaults,
            api_requests_per_minute: 100,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SyncConfig {
        let mut config = SyncConfig::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = url;
            }
        }

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            match addr.parse::<std::net::SocketAddr>() {
                Ok(_) => config.bind_address = addr,
                Err(e) => {
                    tracing::warn!(
                        "Invalid BIND_ADDRESS '{}': {}, using default: {}",
                        addr,
                        e,
                        config.bind_address
                    );
                }
            }
        }

        if let Ok(base) = std::env::var("BROKER_API_BASE") {
            match url::Url::parse(&base) {
                Ok(_) => config.broker_api_base = base,
                Err(e) => {
                    tracing::warn!(
                        "Invalid BROKER_API_BASE '{}': {}, using default: {}",
                        base,
                        e,
                        config.broker_api_base
                    );
                }
            }
        }

        if let Ok(accounts) = std::env::var("BROKER_ACCOUNTS") {
            config.accounts = parse_accounts(&accounts);
        }

        if let Ok(timeout) = std::env::var("BROKER_REQUEST_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (1_000..=120_000).contains(&value) {
                    config.broker_request_timeout = Duration::from_millis(value);
                } else {
                    tracing::warn!(
                        "BROKER_REQUEST_TIMEOUT_MS {} out of range (1000-120000), using default",
                        value
                    );
                }
            }
        }

        if let Ok(lookups) = std::env::var("INSTRUMENT_LOOKUPS_PER_MINUTE") {
            if let Ok(value) = lookups.parse::<u32>() {
                if value > 0 && value <= 6_000 {
                    config.instrument_lookups_per_minute = value;
                }
            }
        }

        if let Ok(hours) = std::env::var("RESYNC_THRESHOLD_HOURS") {
            if let Ok(value) = hours.parse::<i64>() {
                if value > 0 && value <= 24 * 30 {
                    config.resync_threshold = chrono::Duration::hours(value);
                }
            }
        }

        if let Ok(ttl) = std::env::var("PLAN_CACHE_TTL_MS") {
            if let Ok(value) = ttl.parse::<u64>() {
                if value <= 60_000 {
                    config.plan_cache_ttl = Duration::from_millis(value);
                }
            }
        }

        if let Ok(capacity) = std::env::var("PLAN_CACHE_CAPACITY") {
            if let Ok(value) = capacity.parse::<usize>() {
                if value > 0 {
                    config.plan_cache_capacity = value;
                }
            }
        }

        if let Ok(policy) = std::env::var("FALLBACK_POLICY") {
            match FallbackPolicy::parse(&policy) {
                Some(value) => config.fallback_policy = value,
                None => {
                    tracing::warn!(
                        "Unknown FALLBACK_POLICY '{}' (expected safe or propagate), using default: {:?}",
                        policy,
                        config.fallback_policy
                    );
                }
            }
        }

        if let Ok(rpm) = std::env::var("API_REQUESTS_PER_MINUTE") {
            if let Ok(value) = rpm.parse::<u32>() {
                if value > 0 {
                    config.api_requests_per_minute = value;
                }
            }
        }

        config
    }
}

/// Parse `accountId:accNum:token[:userId]` entries separated by commas
///
/// Entries with missing fields are skipped with a warning.
pub fn parse_accounts(raw: &str) -> Vec<AccountRef> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [id, number, token] | [id, number, token, ""]
                    if !id.is_empty() && !number.is_empty() && !token.is_empty() =>
                {
                    Some(AccountRef {
                        account_id: id.to_string(),
                        account_number: number.to_string(),
                        access_token: token.to_string(),
                        user_id: None,
                    })
                }
                [id, number, token, user]
                    if !id.is_empty() && !number.is_empty() && !token.is_empty() =>
                {
                    Some(AccountRef {
                        account_id: id.to_string(),
                        account_number: number.to_string(),
                        access_token: token.to_string(),
                        user_id: Some(user.to_string()),
                    })
                }
                _ => {
                    tracing::warn!(
                        "Ignoring malformed BROKER_ACCOUNTS entry (expected accountId:accNum:token[:userId])"
                    );
                    None
                }
            }
        })
        .collect()
}

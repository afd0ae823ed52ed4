use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
        }
    }
}

/// Limiter guarding the public HTTP API
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Limiter pacing instrument-detail calls to the broker
pub type LookupRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

fn per_minute(requests_per_minute: u32) -> Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>> {
    let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(rpm)))
}

pub fn create_rate_limiter(config: RateLimiterConfig) -> GlobalRateLimiter {
    per_minute(config.requests_per_minute)
}

/// Lookups are spaced evenly, with no burst beyond a single call
pub fn create_lookup_limiter(lookups_per_minute: u32) -> LookupRateLimiter {
    let rpm = NonZeroU32::new(lookups_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(
        Quota::per_minute(rpm).allow_burst(NonZeroU32::MIN),
    ))
}

pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(RateLimiterConfig {
            requests_per_minute: 50,
        });
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_default_config() {
        assert_eq!(RateLimiterConfig::default().requests_per_minute, 100);
    }

    #[test]
    fn test_zero_quota_falls_back_to_one() {
        let limiter = create_rate_limiter(RateLimiterConfig {
            requests_per_minute: 0,
        });
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_lookup_limiter_has_no_burst() {
        let limiter = create_lookup_limiter(600);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}

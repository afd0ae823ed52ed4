use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the broker API adapters
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum BrokerError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Broker API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid broker response: {0}")]
    InvalidResponse(String),
}

impl BrokerError {
    /// Authentication failures are surfaced to the caller, never defaulted
    pub fn is_auth(&self) -> bool {
        matches!(self, BrokerError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BrokerError::Timeout
        } else if e.is_decode() {
            BrokerError::InvalidResponse(e.to_string())
        } else {
            BrokerError::Network(e.to_string())
        }
    }
}

/// Errors raised while validating strategy activity intervals
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntervalError {
    #[error("Inactive dates ({inactive}) outnumber active dates ({active})")]
    InactiveLongerThanActive { active: usize, inactive: usize },

    #[error("Only the last interval may be open-ended ({active} active, {inactive} inactive)")]
    TooManyOpenIntervals { active: usize, inactive: usize },

    #[error("Interval {index} ends before it starts")]
    InvertedInterval { index: usize },

    #[error("Invalid date '{0}'")]
    InvalidDate(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Value must be finite")]
    MustBeFinite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_display() {
        let error = BrokerError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(error.to_string(), "Broker API returned 502: bad gateway");
    }

    #[test]
    fn test_only_unauthorized_is_auth() {
        assert!(BrokerError::Unauthorized("expired".into()).is_auth());
        assert!(!BrokerError::Timeout.is_auth());
        assert!(!BrokerError::Network("reset".into()).is_auth());
    }

    #[test]
    fn test_broker_error_serializes_tagged() {
        let json = serde_json::to_value(BrokerError::Network("reset".into())).unwrap();
        assert_eq!(json["type"], "Network");
        assert_eq!(json["message"], "reset");
    }

    #[test]
    fn test_interval_error_display() {
        let error = IntervalError::InactiveLongerThanActive {
            active: 1,
            inactive: 2,
        };
        assert_eq!(
            error.to_string(),
            "Inactive dates (2) outnumber active dates (1)"
        );
    }
}

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Minimum accepted key length (256 bits of base64)
pub const MIN_KEY_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum AuthConfigError {
    #[error("API_KEYS environment variable is not set")]
    Missing,

    #[error("API key too short (length: {length}, minimum: {min})", min = MIN_KEY_LENGTH)]
    TooShort { length: usize },

    #[error("No API keys found in API_KEYS")]
    Empty,
}

/// Bearer keys accepted by the protected routes
#[derive(Debug, Clone)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    /// Parse a comma-separated key list; every key must meet [`MIN_KEY_LENGTH`]
    pub fn parse(raw: &str) -> Result<Self, AuthConfigError> {
        let mut keys = HashSet::new();
        for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if key.len() < MIN_KEY_LENGTH {
                return Err(AuthConfigError::TooShort { length: key.len() });
            }
            keys.insert(key.to_string());
        }

        if keys.is_empty() {
            return Err(AuthConfigError::Empty);
        }
        Ok(Self(Arc::new(keys)))
    }

    /// Load from `API_KEYS`. The service refuses to start without keys.
    pub fn from_env() -> Result<Self, AuthConfigError> {
        let raw = std::env::var("API_KEYS").map_err(|_| AuthConfigError::Missing)?;
        let keys = Self::parse(&raw)?;
        tracing::info!("✓ API authentication initialized with {} valid key(s)", keys.len());
        Ok(keys)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn is_valid(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// Middleware to require a valid bearer key
pub async fn require_auth(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    match auth_header.and_then(|auth| auth.strip_prefix("Bearer ")) {
        Some(key) if keys.is_valid(key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key attempted");
            Err(StatusCode::UNAUTHORIZED)
        }
        None if auth_header.is_some() => {
            tracing::warn!("Invalid Authorization header format (expected Bearer token)");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

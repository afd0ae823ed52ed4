pub mod dashboard_handler;

use crate::application::services::plan_service::PlanService;
use crate::application::services::sync_service::SyncService;
use crate::auth::{require_auth, ApiKeys};
use crate::rate_limit::{rate_limit_middleware, GlobalRateLimiter};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use dashboard_handler::{get_dashboard, get_plan, health_check, resync_account};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub sync: SyncService,
    pub plans: Arc<PlanService>,
}

/// HTTP API; everything but `/health` requires a bearer key
pub fn router(state: AppState, keys: ApiKeys, limiter: GlobalRateLimiter) -> Router {
    let protected = Router::new()
        .route("/accounts/:account_id/dashboard", post(get_dashboard))
        .route("/accounts/:account_id/resync", post(resync_account))
        .route("/users/:user_id/plan", get(get_plan))
        .route_layer(middleware::from_fn_with_state(keys, require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

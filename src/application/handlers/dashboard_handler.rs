use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::application::services::sync_service::{Dashboard, DashboardView, SyncError};
use crate::domain::entities::account::SyncMetadata;
use crate::domain::entities::plan::PlanLimits;
use crate::domain::errors::BrokerError;
use crate::domain::services::calendar::StrategyIntervals;

/// Body of the dashboard endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRequest {
    pub year: i32,
    /// 1-based month
    pub month: u32,
    /// Strategy activation timestamps (RFC 3339 or epoch milliseconds)
    #[serde(default)]
    pub active_dates: Vec<String>,
    #[serde(default)]
    pub inactive_dates: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub account_id: String,
    pub sync_metadata: SyncMetadata,
    pub accepted_orders: usize,
    pub rejected_orders: usize,
    pub inserted: usize,
    pub closed: usize,
    pub updated: usize,
    pub instrument_lookups: u64,
    pub discarded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub accounts: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            SyncError::UnknownAccount(_) => StatusCode::NOT_FOUND,
            SyncError::Interval(_) | SyncError::InvalidMonth(_) => StatusCode::BAD_REQUEST,
            SyncError::Broker(BrokerError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            SyncError::Broker(BrokerError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::Broker(_) => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "Request failed");
        }
        error_response(status, e)
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        accounts: state.sync.account_count(),
    })
}

/// Positions, metrics and the calendar month for an account
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<DashboardRequest>,
) -> Result<Json<Dashboard>, ApiError> {
    let intervals = StrategyIntervals::from_date_strings(&request.active_dates, &request.inactive_dates)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;

    let view = DashboardView {
        year: request.year,
        month: request.month,
        intervals,
    };

    let dashboard = state.sync.load_or_sync(&account_id, &view).await?;
    Ok(Json(dashboard))
}

/// Resync an account now
pub async fn resync_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<ResyncResponse>, ApiError> {
    let report = state.sync.force_resync(&account_id).await?;
    let stats = &report.normalization;

    Ok(Json(ResyncResponse {
        account_id,
        accepted_orders: stats.accepted,
        rejected_orders: stats.malformed + stats.not_filled + stats.missing_position_id,
        inserted: report.merge.inserted,
        closed: report.merge.closed,
        updated: report.merge.updated,
        instrument_lookups: report.instruments.fetched,
        discarded: report.discarded,
        sync_metadata: report.sync_metadata,
    }))
}

/// Subscription limits for a user
pub async fn get_plan(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PlanLimits>, ApiError> {
    if user_id.trim().is_empty() || user_id.len() > 128 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid user id: '{}'", user_id),
        ));
    }

    Ok(Json(state.plans.limits(&user_id).await))
}

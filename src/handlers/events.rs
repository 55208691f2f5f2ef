//! # Ingestion and Statistics Handlers

use axum::{extract::State, response::Json};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::error::ApiError;
use crate::ingest::IngestReport;
use crate::server::AppState;

/// Run one ingestion cycle over every registered repository
#[utoipa::path(
    post,
    path = "/fetch-events",
    responses(
        (status = 200, description = "Cycle completed", body = IngestReport),
        (status = 400, description = "No repositories configured", body = ApiError),
        (status = 502, description = "Upstream unreachable", body = ApiError),
        (status = "4XX", description = "Upstream rejected a first page; its status is passed through", body = ApiError)
    ),
    tag = "events"
)]
pub async fn fetch_events(State(state): State<AppState>) -> Result<Json<IngestReport>, ApiError> {
    let report = state.tracker.fetch_events().await?;
    info!(repositories = report.repositories.len(), "ingestion triggered over HTTP");
    Ok(Json(report))
}

/// Refresh stored events, then return per-repository timing statistics
#[utoipa::path(
    get,
    path = "/statistics",
    responses(
        (status = 200, description = "Average interval between events per repository and event type", body = Value, example = json!({
            "rust-lang/cargo": {
                "PushEvent": "3600 s (or 1.0 h)",
                "WatchEvent": null,
                "events_count": 3
            }
        })),
        (status = 400, description = "No repositories configured", body = ApiError),
        (status = 502, description = "Upstream unreachable", body = ApiError)
    ),
    tag = "events"
)]
pub async fn get_statistics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.tracker.refresh_statistics().await?;
    let body = serde_json::to_value(&report).map_err(|err| {
        error!(error = %err, "statistics serialization failed");
        ApiError::internal()
    })?;
    Ok(Json(body))
}

//! Event log routes: listing, clearing and CSV export.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rollcall_core::{export_file_name, export_to_dir, generate_csv};
use rollcall_types::AttendanceEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::internal_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct EventsResponse {
    /// Newest first
    pub events: Vec<AttendanceEvent>,
    pub total: usize,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<EventsResponse>, (StatusCode, String)> {
    let events = state.store.recent(query.limit).map_err(internal_error)?;
    let total = state.store.count().map_err(internal_error)?;
    Ok(Json(EventsResponse { events, total }))
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

pub async fn clear(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearResponse>, (StatusCode, String)> {
    let removed = state.processor.clear_events().map_err(internal_error)?;
    tracing::info!(target: "rollcall::api", removed, "Event log cleared");
    Ok(Json(ClearResponse { removed }))
}

/// Full log as a CSV download, oldest first.
pub async fn download_csv(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let events = state.store.events().map_err(internal_error)?;
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(Utc::now()));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        generate_csv(&events),
    ))
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub path: String,
    pub events: usize,
}

/// Write the log into the configured export directory.
pub async fn export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportResponse>, (StatusCode, String)> {
    let path = export_to_dir(&state.store, &state.config.export_dir).map_err(internal_error)?;
    let events = state.store.count().map_err(internal_error)?;

    Ok(Json(ExportResponse {
        path: path.to_string_lossy().to_string(),
        events,
    }))
}

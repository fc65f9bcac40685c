//! Status and flag toggles.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::internal_error;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub logging_enabled: bool,
    pub auto_export: bool,
    pub event_count: usize,
    pub last_event_time: Option<DateTime<Utc>>,
    pub scanning: bool,
    pub seen_candidates: usize,
    pub source: String,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let store = &state.store;
    Ok(Json(StatusResponse {
        logging_enabled: state.processor.logging_enabled(),
        auto_export: store.auto_export().map_err(internal_error)?,
        event_count: store.count().map_err(internal_error)?,
        last_event_time: store.last_event_time().map_err(internal_error)?,
        scanning: state.processor.is_scanning(),
        seen_candidates: state.processor.seen_count(),
        source: state.source.describe(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
}

/// Switch event logging on or off. Subscribers get a `logging_changed` notice.
pub async fn set_logging(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    state
        .processor
        .set_logging_enabled(req.enabled)
        .map_err(internal_error)?;

    tracing::info!(target: "rollcall::api", enabled = req.enabled, "Logging toggled");
    Ok(Json(ToggleResponse { enabled: req.enabled }))
}

pub async fn set_auto_export(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    state.store.set_auto_export(req.enabled).map_err(internal_error)?;

    tracing::info!(target: "rollcall::api", enabled = req.enabled, "Auto export toggled");
    Ok(Json(ToggleResponse { enabled: req.enabled }))
}

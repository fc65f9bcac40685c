//! Manual scans and snapshot pushes.

use axum::{extract::State, http::StatusCode, Json};
use rollcall_core::{parse_snapshot, run_scan, RollcallError};
use rollcall_types::{ScanOutcome, ScanTrigger};
use serde::Serialize;
use std::sync::Arc;

use super::internal_error;
use crate::state::AppState;

/// Scan the current snapshot now. Responds 409 while another scan runs.
pub async fn scan_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScanOutcome>, (StatusCode, String)> {
    let outcome = run_scan(state.processor.clone(), state.source.clone(), ScanTrigger::Manual)
        .await
        .map_err(internal_error)?;

    if let ScanOutcome::Busy = outcome {
        return Err((StatusCode::CONFLICT, "A scan is already running".to_string()));
    }
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct PushResponse {
    pub nodes: usize,
    /// False when a scan was already queued and this push rides along with it.
    pub queued: bool,
}

/// Replace the in-memory snapshot with the request body (HTML or a JSON
/// node tree) and queue a mutation scan.
pub async fn push_document(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<PushResponse>, (StatusCode, String)> {
    let document = parse_snapshot(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let nodes = document.len();

    match state.source.push(document) {
        Ok(()) => {}
        Err(RollcallError::ReadOnlySource) => {
            return Err((
                StatusCode::CONFLICT,
                format!("Snapshots come from {}", state.source.describe()),
            ));
        }
        Err(e) => return Err(internal_error(e)),
    }

    let queued = state.scheduler.trigger(ScanTrigger::Mutation);
    tracing::debug!(target: "rollcall::api", nodes, queued, "Snapshot pushed");
    Ok(Json(PushResponse { nodes, queued }))
}

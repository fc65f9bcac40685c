//! HTTP route handlers.

pub mod events;
pub mod keywords;
pub mod scan;
pub mod status;

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Map a store or pipeline error to a 500, logging it on the way out.
pub(crate) fn internal_error(e: rollcall_core::RollcallError) -> (StatusCode, String) {
    tracing::error!(target: "rollcall::api", "Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

//! Rollcall server library: HTTP command surface, notification WebSocket,
//! configuration and logging. Split from main.rs so the router can be
//! driven from integration tests.

pub mod config;
pub mod global_ws;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Build the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status::get_status))
        .route("/logging", put(routes::status::set_logging))
        .route("/auto-export", put(routes::status::set_auto_export))
        .route("/scan", post(routes::scan::scan_now))
        .route("/document", put(routes::scan::push_document))
        .route("/events", get(routes::events::list).delete(routes::events::clear))
        .route("/export.csv", get(routes::events::download_csv))
        .route("/export", post(routes::events::export))
        .route("/keywords", get(routes::keywords::get).put(routes::keywords::update));

    let ws_routes = Router::new().route("/events", get(global_ws::upgrade));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

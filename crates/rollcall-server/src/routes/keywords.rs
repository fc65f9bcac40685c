//! Keyword configuration routes.

use axum::{extract::State, http::StatusCode, Json};
use rollcall_types::{KeywordError, KeywordSet};
use serde::Deserialize;
use std::sync::Arc;

use super::internal_error;
use crate::state::AppState;

pub async fn get(
    State(state): State<Arc<AppState>>,
) -> Result<Json<KeywordSet>, (StatusCode, String)> {
    state.store.keywords().map(Json).map_err(internal_error)
}

/// Either JSON lists or the comma-separated strings an options form submits.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UpdateKeywordsRequest {
    Lists { checkin: Vec<String>, checkout: Vec<String> },
    CommaSeparated { checkin: String, checkout: String },
}

impl UpdateKeywordsRequest {
    fn into_keyword_set(self) -> Result<KeywordSet, KeywordError> {
        match self {
            Self::Lists { checkin, checkout } => KeywordSet::new(checkin, checkout),
            Self::CommaSeparated { checkin, checkout } => {
                KeywordSet::from_comma_lists(&checkin, &checkout)
            }
        }
    }
}

/// Replace both keyword lists. Returns the normalized set as stored.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateKeywordsRequest>,
) -> Result<Json<KeywordSet>, (StatusCode, String)> {
    let keywords = req
        .into_keyword_set()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let stored = state.store.set_keywords(keywords).map_err(internal_error)?;
    tracing::info!(
        target: "rollcall::api",
        checkin = stored.checkin.len(),
        checkout = stored.checkout.len(),
        "Keywords updated"
    );
    Ok(Json(stored))
}

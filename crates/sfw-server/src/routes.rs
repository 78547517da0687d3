//! # HTTP Route Handlers
//!
//! Service-level endpoints. The optimization endpoint itself lives in
//! `query_graph`, next to its wire types.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use sfw_core::search::{SearchConfig, MAX_SEARCH_TABLES};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /config: the search limits applied to every request.
pub async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ConfigResponse {
        search: state.config.search.clone(),
        effective_max_tables: state.config.search.table_limit(),
        hard_max_tables: MAX_SEARCH_TABLES,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub search: SearchConfig,
    pub effective_max_tables: usize,
    pub hard_max_tables: usize,
}

//! # sfw-server: HTTP Service for the Join-Order Optimizer
//!
//! This binary crate exposes the exhaustive SELECT-FROM-WHERE optimizer as a network
//! service. A client sends one query block together with the statistics of the
//! tables it reads and gets back the cheapest logical plan and its cost.
//!
//! ## Endpoints
//!
//! - `GET  /health`    - Health check
//! - `GET  /config`    - Search limits in effect
//! - `POST /optimize`  - Optimize a query block (JSON query-graph protocol)
//!
//! ## Configuration
//!
//! The server listens on `SFW_BIND_ADDR` (default `0.0.0.0:3000`) and accepts up to
//! `SFW_MAX_TABLES` tables per query (default 9). Logging is controlled by the
//! `RUST_LOG` environment variable (defaults to `sfw=debug`).

mod query_graph;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sfw=debug".parse()?))
        .init();

    let config = state::OptimizerConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/config", get(routes::config))
        .route("/optimize", post(query_graph::optimize_query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr.as_str()).await?;
    tracing::info!("sfw-server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

//! # Application State
//!
//! Built once at startup from the environment and handed to every handler behind an
//! `Arc`. Requests carry their own table definitions and statistics, so the state holds
//! configuration only: the search limits applied to every request and the address
//! the server binds to.

use sfw_core::search::SearchConfig;
use std::env;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Server-level optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Search limits. A request may lower `max_tables`, never raise it.
    pub search: SearchConfig,
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl OptimizerConfig {
    /// Read overrides from `SFW_BIND_ADDR` and `SFW_MAX_TABLES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup("SFW_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(raw) = lookup("SFW_MAX_TABLES") {
            match raw.parse::<usize>() {
                Ok(n) => config.search.max_tables = n,
                Err(e) => warn!("Ignoring SFW_MAX_TABLES={:?}: {}", raw, e),
            }
        }
        config
    }

    /// Search config for one request, honoring an optional lower table limit.
    pub fn search_for(&self, requested_max_tables: Option<usize>) -> SearchConfig {
        let mut search = self.search.clone();
        if let Some(n) = requested_max_tables {
            search.max_tables = search.max_tables.min(n);
        }
        search
    }
}

/// State shared by the handlers through axum's `State` extractor.
pub struct AppState {
    pub config: OptimizerConfig,
}

impl AppState {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }
}

//! # Query-Graph Optimization Endpoint
//!
//! A JSON protocol for handing one SELECT-FROM-WHERE block to the optimizer. The
//! request is self-contained: it describes the tables involved (schema, row count and
//! per-column statistics), the FROM bindings, and the select, WHERE and grouping
//! expressions. The WHERE list is already in CNF, one clause per element.
//!
//! ## Wire Protocol
//!
//! - Request: `POST /optimize` with JSON body (`QueryGraphRequest`)
//! - Response: JSON body (`QueryGraphResponse`) with the plan trace and its cost
//!
//! Expressions use the serde encoding of `sfw_core::expr::Expr`, e.g.
//! `{"BinaryOp": {"op": "Eq", "left": {"Column": {"table": "r", "name": "a"}},
//! "right": {"Literal": {"Int64": 5}}}}`. Columns may omit `table`; the binder
//! qualifies them.
//!
//! ## Errors
//!
//! - 400 Bad Request: the query does not bind or exceeds the table limit
//! - 500 Internal Server Error: no valid plan found

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use sfw_core::catalog::InMemoryCatalog;
use sfw_core::expr::Expr;
use sfw_core::plan::PlanTrace;
use sfw_core::query::{FromItem, OptimizedPlan, SfwQuery};
use sfw_core::schema::{AttrType, Schema, Table};
use sfw_core::search::{SearchConfig, SearchCounters};
use sfw_core::stats::{ColumnStatistics, Statistics};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// JSON wire-protocol types
// ---------------------------------------------------------------------------

/// Request body for `POST /optimize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGraphRequest {
    /// Base tables referenced by `from`.
    pub tables: Vec<TableInfo>,
    /// `table AS alias` bindings, in the order the search should consider them.
    pub from: Vec<FromItem>,
    #[serde(default)]
    pub select: Vec<Expr>,
    /// CNF clauses. Empty means no WHERE clause.
    #[serde(default, rename = "where")]
    pub where_clauses: Vec<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    /// Optional lower table limit for this request.
    #[serde(default)]
    pub max_tables: Option<usize>,
}

/// A base table with its statistics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    pub row_count: f64,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

/// One attribute of a table and its statistics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default = "default_attr_type", rename = "type")]
    pub ty: AttrType,
    /// Number of distinct values. Unknown means every value is distinct.
    #[serde(default)]
    pub ndv: Option<f64>,
    /// Fraction of values that are NULL (0.0 to 1.0).
    #[serde(default)]
    pub null_fraction: f64,
}

fn default_attr_type() -> AttrType {
    AttrType::Int
}

/// Response body from the optimization endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGraphResponse {
    /// Total estimated cost of the optimized plan.
    pub cost: f64,
    /// Estimated cardinality of the query result.
    pub row_count: f64,
    /// Join order in compact notation, e.g. `((r ⋈ s) ⋈ t)`.
    pub shape: String,
    pub plan: PlanTrace,
    /// Distinct bipartitions evaluated at the root.
    pub partitions_visited: usize,
    pub counters: SearchCounters,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /optimize: find the cheapest join order for one query block.
pub async fn optimize_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryGraphRequest>,
) -> Result<Json<QueryGraphResponse>, (StatusCode, String)> {
    let config = state.config.search_for(req.max_tables);
    run_optimization(&req, &config).map(Json)
}

/// The request pipeline: build the catalog, bind and search, shape the response.
fn run_optimization(
    req: &QueryGraphRequest,
    config: &SearchConfig,
) -> Result<QueryGraphResponse, (StatusCode, String)> {
    let catalog = build_catalog(req)?;
    let query = build_query(req);
    debug!("Optimizing query:\n{}", query);

    let plan: OptimizedPlan<Statistics> = query
        .optimize(&catalog, config)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid query: {}", e)))?;

    let no_plan = || {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Optimization failed: no valid plan found".to_string(),
        )
    };
    let trace = plan.render().ok_or_else(no_plan)?;
    let shape = plan.shape().ok_or_else(no_plan)?;
    let row_count = plan.row_count().ok_or_else(no_plan)?;

    info!(
        "Optimized {} table(s): {} cost={} partitions={}",
        req.from.len(),
        shape,
        plan.cost,
        plan.root_partitions
    );

    Ok(QueryGraphResponse {
        cost: plan.cost.total,
        row_count,
        shape,
        plan: trace,
        partitions_visited: plan.root_partitions,
        counters: plan.counters,
    })
}

/// Build an InMemoryCatalog populated with the tables of the request.
fn build_catalog(req: &QueryGraphRequest) -> Result<InMemoryCatalog, (StatusCode, String)> {
    let mut catalog = InMemoryCatalog::new();
    let mut seen = HashSet::new();

    for info in &req.tables {
        if !seen.insert(info.name.as_str()) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Table '{}' is defined more than once", info.name),
            ));
        }

        let mut schema = Schema::new();
        for col in &info.columns {
            schema = schema.with_attr(col.name.as_str(), col.ty);
        }
        let mut table = Table::new(info.name.as_str(), schema, info.row_count);
        for col in &info.columns {
            if let Some(ndv) = col.ndv {
                table = table.with_column_stats(col.name.as_str(), ColumnStatistics::new(ndv, col.null_fraction));
            }
        }
        catalog.add_table(table);
    }

    Ok(catalog)
}

fn build_query(req: &QueryGraphRequest) -> SfwQuery {
    let cnf = req.where_clauses.iter().cloned().map(Expr::into_clause).collect();
    SfwQuery::new(req.select.clone(), req.from.clone(), cnf).with_grouping(req.group_by.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OptimizerConfig;

    fn request(body: serde_json::Value) -> QueryGraphRequest {
        serde_json::from_value(body).expect("valid request JSON")
    }

    fn rs_request() -> serde_json::Value {
        serde_json::json!({
            "tables": [
                {"name": "r", "rowCount": 1000.0, "columns": [{"name": "a", "ndv": 1000.0}]},
                {"name": "s", "rowCount": 1000.0, "columns": [{"name": "b", "ndv": 1000.0}]}
            ],
            "from": [{"table": "r", "alias": "r"}, {"table": "s", "alias": "s"}],
            "select": [{"Column": {"name": "b"}}],
            "where": [
                {"BinaryOp": {"op": "Eq",
                    "left": {"Column": {"table": "r", "name": "a"}},
                    "right": {"Column": {"table": "s", "name": "b"}}}},
                {"BinaryOp": {"op": "Gt",
                    "left": {"Column": {"name": "a"}},
                    "right": {"Literal": {"Int64": 5}}}}
            ]
        })
    }

    #[test]
    fn test_build_catalog() {
        let req = request(rs_request());
        let catalog = build_catalog(&req).unwrap();
        let r = catalog.tables.get("r").expect("should have r");
        assert_eq!(r.tuple_count, 1000.0);
        assert_eq!(r.schema.len(), 1);
        assert!(r.column_stats.contains_key("a"));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let req = request(serde_json::json!({
            "tables": [{"name": "r", "rowCount": 1.0}, {"name": "r", "rowCount": 2.0}],
            "from": [{"table": "r", "alias": "r"}]
        }));
        let (status, _) = build_catalog(&req).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_run_optimization_pushes_filter() {
        let req = request(rs_request());
        let resp = run_optimization(&req, &SearchConfig::default()).unwrap();

        assert_eq!(resp.shape, "(r ⋈ s)");
        assert_eq!(resp.partitions_visited, 1);
        assert_eq!(resp.plan.nodes.len(), 3);
        assert_eq!(resp.plan.nodes[0].predicates, vec!["r.a = s.b"]);
        assert_eq!(resp.plan.nodes[1].predicates, vec!["r.a > 5"]);
        assert!(resp.plan.nodes[1].row_count < 1000.0);
        assert!(resp.cost > 0.0);

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("partitionsVisited").is_some());
        assert_eq!(json["plan"]["nodes"][0]["outputTable"], "join(r,s)");
    }

    #[test]
    fn test_binding_errors_are_bad_requests() {
        let mut body = rs_request();
        body["from"] = serde_json::json!([{"table": "r", "alias": "r"}, {"table": "t", "alias": "t"}]);
        let (status, message) = run_optimization(&request(body), &SearchConfig::default()).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("unknown table 't'"), "{}", message);
    }

    #[test]
    fn test_huge_cross_product_is_still_planned() {
        let req = request(serde_json::json!({
            "tables": [{"name": "l", "rowCount": 1e200}, {"name": "r", "rowCount": 1e200}],
            "from": [{"table": "l", "alias": "l"}, {"table": "r", "alias": "r"}]
        }));
        let resp = run_optimization(&req, &SearchConfig::default()).unwrap();
        assert_eq!(resp.shape, "(l ⋈ r)");
        assert_eq!(resp.cost, f64::MAX);
        assert_eq!(resp.row_count, f64::MAX);
    }

    #[tokio::test]
    async fn test_handler_applies_request_limit() {
        let state = Arc::new(AppState::new(OptimizerConfig::default()));

        let mut body = rs_request();
        body["maxTables"] = serde_json::json!(1);
        let (status, message) = optimize_query(State(state.clone()), Json(request(body)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("limit of 1"), "{}", message);

        let Json(resp) = optimize_query(State(state), Json(request(rs_request())))
            .await
            .unwrap();
        assert_eq!(resp.counters.optimize_calls, 3);
    }
}

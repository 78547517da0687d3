//! # sfw-core: Exhaustive Join-Order Optimizer
//!
//! This crate finds the cheapest logical plan for a SELECT-FROM-WHERE query over any
//! number of tables. It enumerates every bipartition of the table set recursively,
//! pushes each CNF clause down as far as it can go, prunes the attributes each side
//! has to carry, and costs every candidate with a cardinality estimator.
//!
//! ## Module Overview
//!
//! - **`schema`**: Base tables, aliased table references and attribute schemas.
//! - **`expr`**: Scalar expressions and CNF clauses.
//! - **`catalog`**: Catalog trait for resolving table names, plus an in-memory catalog.
//! - **`stats`**: The statistics contract and the default cardinality estimator.
//! - **`partition`**: Clause classification and schema projection for one split.
//! - **`plan`**: Arena of logical plan nodes and the rendered plan trace.
//! - **`cost`**: Plan cost values.
//! - **`search`**: The exhaustive subset-enumeration search.
//! - **`query`**: Parsed queries, binding and the optimize entry point.
//! - **`error`**: Errors reported for invalid input.

pub mod catalog;
pub mod cost;
pub mod error;
pub mod expr;
pub mod partition;
pub mod plan;
pub mod query;
pub mod schema;
pub mod search;
pub mod stats;

//! # Statistics for Cost-Based Optimization
//!
//! The optimizer never looks at data. Every decision it makes is driven by
//! statistics snapshots: immutable estimates of how many rows a relation holds and
//! how its values are distributed. The search consumes snapshots through the
//! [`RelationStats`] contract and is generic over it, so a different estimator
//! (histogram based, sampled, learned) can be plugged in without touching the search.
//!
//! ## Immutability
//!
//! No estimate mutates its input. Applying a selection or a join always yields a new
//! snapshot, which lets the search share one snapshot (behind an `Arc`) between many
//! candidate plans.
//!
//! ## Default Estimator
//!
//! [`Statistics`] keeps a row count and per-column statistics keyed by the qualified
//! column name (`alias.attribute`), so the two sides of a self-join never collide.
//!
//! - **Selection**: output_rows = input_rows * product of clause selectivities
//!   (independence assumption). Column NDVs are capped by the output row count;
//!   equality with a constant pins the column's NDV to 1.
//! - **Join**: the cross product of both inputs, then the cross clauses applied as a
//!   selection. An equi-join clause therefore has selectivity 1 / max(NDV_l, NDV_r),
//!   the usual containment assumption, and a join without clauses is a full cross
//!   product.
//!
//! ## Selectivity Estimation
//!
//! - **Equality with a constant**: 1 / NDV.
//! - **Equality of two columns**: 1 / max(NDV_a, NDV_b).
//! - **Inequality (`<>`)**: 1 - 1 / NDV.
//! - **Range**: fixed 1/3.
//! - **IS NULL / IS NOT NULL**: the null fraction and its complement.
//! - **NOT, OR, AND**: complement, inclusion-exclusion, product.
//! - **Default**: 0.1 when nothing better is known.

use crate::expr::{BinaryOp, Clause, ColumnRef, Expr, ScalarValue, UnaryOp};
use crate::schema::TableRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range comparison (`<`, `<=`, `>`, `>=`).
pub const RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// The statistics contract the search is written against.
///
/// Implementations must be pure: every method returns a new snapshot and leaves
/// `self` untouched.
pub trait RelationStats: Clone + Debug {
    /// Bootstrap snapshot for a base table bound to an alias.
    fn from_table(table: &TableRef) -> Self;

    /// Snapshot of two relations combined without any predicate knowledge.
    fn from_join(left: &Self, right: &Self) -> Self;

    /// Effect of applying `clauses` to this relation.
    fn estimate_selection(&self, clauses: &[Clause]) -> Self;

    /// Relation produced by joining `self` with `other` under `cross_clauses`.
    fn estimate_join(&self, cross_clauses: &[Clause], other: &Self) -> Self;

    fn row_count_estimate(&self) -> f64;
}

/// Per-column statistics used for selectivity estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    #[serde(default)]
    pub null_fraction: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
        }
    }
}

/// Default statistics snapshot for a relation (base or intermediate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    /// Keyed by qualified column name (`alias.attribute`).
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    pub fn column(&self, col: &ColumnRef) -> Option<&ColumnStatistics> {
        self.column_stats.get(&col.key())
    }

    /// NDV of a column, conservatively the row count when unknown.
    fn distinct(&self, col: &ColumnRef) -> f64 {
        self.column(col)
            .map(|s| s.distinct_count)
            .unwrap_or(self.row_count)
            .max(1.0)
    }

    /// Estimate the selectivity of one predicate against this relation.
    pub fn selectivity(&self, expr: &Expr) -> f64 {
        let sel = match expr {
            Expr::Literal(ScalarValue::Bool(true)) => 1.0,
            Expr::Literal(ScalarValue::Bool(false)) | Expr::Literal(ScalarValue::Null) => 0.0,
            Expr::BinaryOp { op, left, right } => match (op, left.as_ref(), right.as_ref()) {
                (BinaryOp::Eq, Expr::Column(a), Expr::Column(b)) => {
                    1.0 / self.distinct(a).max(self.distinct(b))
                }
                (BinaryOp::Eq, Expr::Column(c), _) | (BinaryOp::Eq, _, Expr::Column(c)) => {
                    1.0 / self.distinct(c)
                }
                (BinaryOp::NotEq, Expr::Column(c), _) | (BinaryOp::NotEq, _, Expr::Column(c)) => {
                    1.0 - 1.0 / self.distinct(c)
                }
                (op, _, _) if op.is_range() => RANGE_SELECTIVITY,
                _ => DEFAULT_FILTER_SELECTIVITY,
            },
            Expr::UnaryOp { op, operand } => match (op, operand.as_ref()) {
                (UnaryOp::Not, inner) => 1.0 - self.selectivity(inner),
                (UnaryOp::IsNull, Expr::Column(c)) => {
                    self.column(c).map(|s| s.null_fraction).unwrap_or(DEFAULT_FILTER_SELECTIVITY)
                }
                (UnaryOp::IsNotNull, Expr::Column(c)) => {
                    1.0 - self.column(c).map(|s| s.null_fraction).unwrap_or(0.0)
                }
                _ => DEFAULT_FILTER_SELECTIVITY,
            },
            // Independence assumption: P(A AND B) = P(A) * P(B).
            Expr::And(conjuncts) => conjuncts.iter().map(|c| self.selectivity(c)).product(),
            // Inclusion-exclusion: P(A OR B) = 1 - (1 - P(A)) * (1 - P(B)).
            Expr::Or(disjuncts) => {
                let miss: f64 = disjuncts.iter().map(|d| 1.0 - self.selectivity(d)).product();
                1.0 - miss
            }
            _ => DEFAULT_FILTER_SELECTIVITY,
        };
        sel.clamp(0.0, 1.0)
    }
}

/// Floor estimates at one row, except for relations that are already empty.
fn floor_rows(input_rows: f64, estimate: f64) -> f64 {
    if input_rows <= 0.0 {
        0.0
    } else {
        estimate.max(1.0)
    }
}

impl RelationStats for Statistics {
    fn from_table(table: &TableRef) -> Self {
        let base = table.table();
        let mut column_stats = HashMap::new();
        for attr in base.schema.attrs() {
            let cs = base.column_stats.get(&attr.name).cloned().unwrap_or_else(|| {
                // No statistics gathered: assume every value is distinct.
                ColumnStatistics::new(base.tuple_count.max(1.0), 0.0)
            });
            column_stats.insert(ColumnRef::qualified(table.alias(), &attr.name).key(), cs);
        }
        Statistics {
            row_count: base.tuple_count.clamp(0.0, f64::MAX),
            column_stats,
        }
    }

    fn from_join(left: &Self, right: &Self) -> Self {
        let mut column_stats = left.column_stats.clone();
        for (name, stats) in &right.column_stats {
            column_stats.insert(name.clone(), stats.clone());
        }
        Statistics {
            // saturate so an overflowing estimate stays finite
            row_count: (left.row_count * right.row_count).min(f64::MAX),
            column_stats,
        }
    }

    fn estimate_selection(&self, clauses: &[Clause]) -> Self {
        let selectivity: f64 = clauses.iter().map(|c| self.selectivity(c)).product();
        let row_count = floor_rows(self.row_count, self.row_count * selectivity);

        // A relation can't hold more distinct values than rows.
        let mut column_stats = HashMap::new();
        for (name, stats) in &self.column_stats {
            let mut cs = stats.clone();
            cs.distinct_count = cs.distinct_count.min(row_count).max(1.0);
            column_stats.insert(name.clone(), cs);
        }

        // Equality conjuncts pin distinct counts below the row-count cap.
        for clause in clauses {
            for conjunct in clause.conjuncts() {
                let Expr::BinaryOp { op: BinaryOp::Eq, left, right } = conjunct else {
                    continue;
                };
                match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(a), Expr::Column(b)) => {
                        let (ka, kb) = (a.key(), b.key());
                        let shared = match (column_stats.get(&ka), column_stats.get(&kb)) {
                            (Some(x), Some(y)) => x.distinct_count.min(y.distinct_count),
                            _ => continue,
                        };
                        for key in [ka, kb] {
                            if let Some(cs) = column_stats.get_mut(&key) {
                                cs.distinct_count = shared;
                            }
                        }
                    }
                    (Expr::Column(c), Expr::Literal(_)) | (Expr::Literal(_), Expr::Column(c)) => {
                        if let Some(cs) = column_stats.get_mut(&c.key()) {
                            cs.distinct_count = 1.0;
                        }
                    }
                    _ => {}
                }
            }
        }

        Statistics {
            row_count,
            column_stats,
        }
    }

    fn estimate_join(&self, cross_clauses: &[Clause], other: &Self) -> Self {
        Statistics::from_join(self, other).estimate_selection(cross_clauses)
    }

    fn row_count_estimate(&self) -> f64 {
        self.row_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrType, Schema, Table};
    use std::sync::Arc;

    fn table(name: &str, rows: f64, cols: &[(&str, f64)]) -> Arc<Table> {
        let mut schema = Schema::new();
        for (col, _) in cols {
            schema = schema.with_attr(*col, AttrType::Int);
        }
        let mut t = Table::new(name, schema, rows);
        for (col, ndv) in cols {
            t = t.with_column_stats(*col, ColumnStatistics::new(*ndv, 0.0));
        }
        Arc::new(t)
    }

    fn int(v: i64) -> Expr {
        Expr::literal(ScalarValue::Int64(v))
    }

    #[test]
    fn test_from_table_qualifies_columns() {
        let t = table("orders", 1000.0, &[("o_id", 1000.0), ("o_cust", 50.0)]);
        let stats = Statistics::from_table(&t.alias("o"));
        assert_eq!(stats.row_count_estimate(), 1000.0);
        assert_eq!(stats.column_stats["o.o_cust"].distinct_count, 50.0);
        assert!(!stats.column_stats.contains_key("orders.o_cust"));
    }

    #[test]
    fn test_equality_and_range_selection() {
        let t = table("r", 1000.0, &[("a", 100.0), ("b", 10.0)]);
        let stats = Statistics::from_table(&t.alias("r"));

        let eq = Expr::binary(BinaryOp::Eq, Expr::column("r", "a"), int(7)).into_clause();
        let filtered = stats.estimate_selection(&[eq]);
        assert!((filtered.row_count_estimate() - 10.0).abs() < 1e-9);
        assert_eq!(filtered.column_stats["r.a"].distinct_count, 1.0);

        let range = Expr::binary(BinaryOp::Gt, Expr::column("r", "b"), int(3)).into_clause();
        let filtered = stats.estimate_selection(&[range]);
        assert!((filtered.row_count_estimate() - 1000.0 / 3.0).abs() < 1e-9);

        // The input snapshot is untouched.
        assert_eq!(stats.row_count_estimate(), 1000.0);
        assert_eq!(stats.column_stats["r.a"].distinct_count, 100.0);
    }

    #[test]
    fn test_disjunction_uses_inclusion_exclusion() {
        let t = table("r", 1000.0, &[("a", 10.0), ("b", 10.0)]);
        let stats = Statistics::from_table(&t.alias("r"));
        let clause = Expr::Or(vec![
            Expr::binary(BinaryOp::Eq, Expr::column("r", "a"), int(1)),
            Expr::binary(BinaryOp::Eq, Expr::column("r", "b"), int(2)),
        ]);
        let sel = stats.selectivity(&clause);
        assert!((sel - 0.19).abs() < 1e-9);
    }

    #[test]
    fn test_constant_clauses() {
        let t = table("r", 200.0, &[("a", 10.0)]);
        let stats = Statistics::from_table(&t.alias("r"));
        let yes = Expr::literal(ScalarValue::Bool(true)).into_clause();
        assert_eq!(stats.estimate_selection(&[yes]).row_count_estimate(), 200.0);
        let no = Expr::literal(ScalarValue::Bool(false)).into_clause();
        assert_eq!(stats.estimate_selection(&[no]).row_count_estimate(), 1.0);
    }

    #[test]
    fn test_equi_join_uses_max_ndv() {
        let r = table("r", 1000.0, &[("a", 100.0)]);
        let s = table("s", 500.0, &[("b", 250.0)]);
        let rs = Statistics::from_table(&r.alias("r"));
        let ss = Statistics::from_table(&s.alias("s"));

        let cond = Expr::binary(BinaryOp::Eq, Expr::column("r", "a"), Expr::column("s", "b")).into_clause();
        let joined = rs.estimate_join(&[cond], &ss);
        assert!((joined.row_count_estimate() - 1000.0 * 500.0 / 250.0).abs() < 1e-6);
        assert_eq!(joined.column_stats["r.a"].distinct_count, 100.0);
        assert_eq!(joined.column_stats["s.b"].distinct_count, 100.0);
    }

    #[test]
    fn test_join_without_clauses_is_cross_product() {
        let r = table("r", 30.0, &[("a", 30.0)]);
        let s = table("s", 40.0, &[("b", 4.0)]);
        let joined = Statistics::from_table(&r.alias("r"))
            .estimate_join(&[], &Statistics::from_table(&s.alias("s")));
        assert_eq!(joined.row_count_estimate(), 1200.0);
    }

    #[test]
    fn test_self_join_columns_do_not_collide() {
        let e = table("employees", 100.0, &[("id", 100.0), ("manager_id", 10.0)]);
        let a = Statistics::from_table(&e.alias("e"));
        let m = Statistics::from_table(&e.alias("m"));
        let joined = Statistics::from_join(&a, &m);
        assert_eq!(joined.column_stats.len(), 4);
        assert_eq!(joined.row_count_estimate(), 10_000.0);
    }

    #[test]
    fn test_empty_relation_stays_empty() {
        let t = table("r", 0.0, &[("a", 1.0)]);
        let stats = Statistics::from_table(&t.alias("r"));
        let eq = Expr::binary(BinaryOp::Eq, Expr::column("r", "a"), int(1)).into_clause();
        assert_eq!(stats.estimate_selection(&[eq]).row_count_estimate(), 0.0);
    }

    #[test]
    fn test_cross_product_saturates() {
        let huge = table("huge", 1e200, &[("a", 1e200)]);
        let joined = Statistics::from_table(&huge.alias("l"))
            .estimate_join(&[], &Statistics::from_table(&huge.alias("r")));
        assert_eq!(joined.row_count_estimate(), f64::MAX);
    }
}

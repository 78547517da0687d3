//! # Cost Model
//!
//! The cost of a logical plan is the total number of rows it materializes: every
//! table scan contributes its filtered row count and every join contributes its
//! estimated output cardinality.
//!
//! ```text
//! cost(scan)          = |scan|
//! cost(left ⋈ right)  = cost(left) + cost(right) + |left ⋈ right|
//! ```
//!
//! The combination is fixed and monotonic: a plan never gets cheaper by making any
//! sub-plan more expensive, which is what allows the search to keep only the cheapest
//! plan for each table set. There are no tuning coefficients.
//!
//! An absent plan costs +infinity, which compares worse than any real plan. Real
//! costs saturate at `f64::MAX` so that an overflowing estimate never reads as "no
//! plan".

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Estimated expense of a plan. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    pub total: f64,
}

impl Cost {
    pub fn new(total: f64) -> Self {
        Self { total }
    }

    /// Cost of a missing plan.
    pub fn infinite() -> Self {
        Self { total: f64::INFINITY }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::INFINITY
    }

    /// Cost of a table scan producing `rows` rows.
    pub fn scan(rows: f64) -> Self {
        Self::new(rows.clamp(0.0, f64::MAX))
    }

    /// Cost of joining two costed inputs into a relation of `join_rows` rows.
    pub fn join(left: Cost, right: Cost, join_rows: f64) -> Self {
        let total = left.total + right.total + join_rows.max(0.0);
        Self::new(total.min(f64::MAX))
    }

    /// Strict comparison used to pick a new best plan; ties keep the earlier plan.
    pub fn beats(&self, other: &Cost) -> bool {
        self.total < other.total
    }
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        if self.is_infinite() || other.is_infinite() {
            return self.is_infinite() && other.is_infinite();
        }
        (self.total - other.total).abs() <= f64::EPSILON * self.total.abs().max(other.total.abs()).max(1.0)
    }
}

/// Consistent with `eq`: costs within the epsilon order as `Equal`.
impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        self.total.partial_cmp(&other.total)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{:.1}", self.total)
        }
    }
}

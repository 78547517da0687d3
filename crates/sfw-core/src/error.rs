//! Errors reported to the caller of the optimizer.
//!
//! The search itself never fails: a table set without a feasible plan yields an
//! absent plan with infinite cost. Everything here is a problem with the input.

/// Errors that can occur while binding or optimizing a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimizeError {
    /// The FROM list is empty.
    #[error("query has no tables to optimize")]
    NoTables,
    /// More tables than the configured enumeration limit.
    #[error("query joins {count} tables, more than the limit of {limit}")]
    TooManyTables { count: usize, limit: usize },
    /// A FROM entry names a table the catalog does not know.
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    /// Two FROM entries share one alias.
    #[error("alias '{0}' is bound more than once")]
    DuplicateAlias(String),
    /// A column is qualified with an alias that is not in the FROM list.
    #[error("unknown alias '{alias}' in {expr}")]
    UnknownAlias { alias: String, expr: String },
    /// A column names an attribute the aliased table does not have.
    #[error("table bound to '{alias}' has no attribute '{attribute}'")]
    UnknownAttribute { alias: String, attribute: String },
    /// An unqualified column matches no table.
    #[error("column '{0}' not found in any table")]
    UnknownColumn(String),
    /// An unqualified column matches more than one table.
    #[error("column '{0}' is ambiguous")]
    AmbiguousColumn(String),
    /// A clause handed directly to the search has an unqualified column.
    #[error("column '{column}' in {expr} is not qualified by an alias")]
    UnqualifiedColumn { column: String, expr: String },
}

//! # Predicate and Value Expressions
//!
//! Expressions appear in three places of a SELECT-FROM-WHERE query: the select
//! list, the grouping list and the WHERE clause. The WHERE clause reaches the
//! optimizer already in conjunctive normal form: an ordered list of clauses that
//! are implicitly AND-ed together, each of which may itself be a disjunction.
//!
//! ## Clauses and Identity
//!
//! A single CNF clause is shared as a [`Clause`] (`Arc<Expr>`). The optimizer never
//! rewrites a clause; it only routes it to the plan node that applies it. Two
//! clauses with identical text are still different predicates, so the identity of
//! a clause is the allocation it lives in ([`same_clause`]), not its structure.
//!
//! ## Qualification
//!
//! Column references carry the alias of the table they belong to. The optimizer
//! classifies clauses purely by those aliases, so every clause handed to the search
//! must be fully qualified. `query` takes care of that when binding a parsed query.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One clause of a CNF filter.
pub type Clause = Arc<Expr>;

/// True when both handles refer to the same clause (not merely equal text).
pub fn same_clause(a: &Clause, b: &Clause) -> bool {
    Arc::ptr_eq(a, b)
}

/// Reference to an attribute, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default)]
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    /// Statistics key for this column (`alias.attribute`).
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Constant values that appear in queries (e.g., `WHERE r.a > 5`).
///
/// `Float64` is wrapped in `OrderedFloat` so that expressions stay `Eq + Hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Days since 1970-01-01.
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v.into_inner()),
            Self::Utf8(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Named function call, including aggregates in the select list (`SUM(r.a)`).
    Function {
        name: String,
        args: Vec<Expr>,
    },
    And(Vec<Expr>),
    /// Disjunction; the usual shape of a non-trivial CNF clause.
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::qualified(table, name))
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Wrap this expression as a shareable CNF clause.
    pub fn into_clause(self) -> Clause {
        Arc::new(self)
    }

    /// Return all column references in this expression.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// Check if this expression references columns of the table bound to `alias`.
    pub fn references_table(&self, alias: &str) -> bool {
        self.columns()
            .iter()
            .any(|c| c.table.as_deref() == Some(alias))
    }

    /// Check if this expression references exactly `alias.attribute`.
    pub fn references_attribute(&self, alias: &str, attribute: &str) -> bool {
        self.columns()
            .iter()
            .any(|c| c.table.as_deref() == Some(alias) && c.name == attribute)
    }

    /// Text form used in plan traces and query descriptions.
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }

    /// Flatten AND-chains: (A AND (B AND C)) → [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Rebuild this expression with every column reference passed through `f`.
    ///
    /// Used by the binder to qualify and validate columns; the first error aborts.
    pub fn try_map_columns<E>(
        &self,
        f: &mut impl FnMut(&ColumnRef) -> Result<ColumnRef, E>,
    ) -> Result<Expr, E> {
        Ok(match self {
            Expr::Column(c) => Expr::Column(f(c)?),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.try_map_columns(f)?),
                right: Box::new(right.try_map_columns(f)?),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.try_map_columns(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.try_map_columns(f))
                    .collect::<Result<_, _>>()?,
            },
            Expr::And(exprs) => Expr::And(
                exprs
                    .iter()
                    .map(|e| e.try_map_columns(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Or(exprs) => Expr::Or(
                exprs
                    .iter()
                    .map(|e| e.try_map_columns(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, exprs: &[Expr], sep: &str) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryOp { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT ({})", operand),
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::IsNull => write!(f, "{} IS NULL", operand),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", operand),
            },
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::And(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " AND ")?;
                write!(f, ")")
            }
            Expr::Or(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " OR ")?;
                write!(f, ")")
            }
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_range(&self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt(table: &str, col: &str, v: i64) -> Expr {
        Expr::binary(
            BinaryOp::Gt,
            Expr::column(table, col),
            Expr::literal(ScalarValue::Int64(v)),
        )
    }

    #[test]
    fn test_references_table_and_attribute() {
        let clause = Expr::Or(vec![
            gt("r", "a", 5),
            Expr::binary(BinaryOp::Eq, Expr::column("s", "b"), Expr::column("t", "c")),
        ]);

        assert!(clause.references_table("r"));
        assert!(clause.references_table("s"));
        assert!(clause.references_table("t"));
        assert!(!clause.references_table("u"));

        assert!(clause.references_attribute("r", "a"));
        assert!(!clause.references_attribute("r", "b"));
        assert!(!clause.references_attribute("s", "a"));
    }

    #[test]
    fn test_constant_clause_references_nothing() {
        let clause = Expr::literal(ScalarValue::Bool(true));
        assert!(clause.columns().is_empty());
        assert!(!clause.references_table("r"));
    }

    #[test]
    fn test_display() {
        let clause = Expr::Or(vec![
            gt("r", "a", 5),
            Expr::binary(
                BinaryOp::Eq,
                Expr::column("r", "name"),
                Expr::literal(ScalarValue::Utf8("o'brien".into())),
            ),
        ]);
        assert_eq!(clause.to_display_string(), "(r.a > 5 OR r.name = 'o''brien')");

        let not_null = Expr::UnaryOp {
            op: UnaryOp::IsNotNull,
            operand: Box::new(Expr::Column(ColumnRef::unqualified("x"))),
        };
        assert_eq!(not_null.to_string(), "x IS NOT NULL");

        let sum = Expr::Function {
            name: "SUM".into(),
            args: vec![Expr::column("r", "a")],
        };
        assert_eq!(sum.to_string(), "SUM(r.a)");
    }

    #[test]
    fn test_clause_identity_is_not_structural() {
        let a = gt("r", "a", 5).into_clause();
        let b = gt("r", "a", 5).into_clause();
        assert_eq!(a, b);
        assert!(!same_clause(&a, &b));
        assert!(same_clause(&a, &Arc::clone(&a)));
    }

    #[test]
    fn test_try_map_columns_qualifies() {
        let e = Expr::binary(
            BinaryOp::Eq,
            Expr::Column(ColumnRef::unqualified("a")),
            Expr::column("s", "b"),
        );
        let bound: Result<Expr, ()> = e.try_map_columns(&mut |c| {
            Ok(ColumnRef::qualified(c.table.clone().unwrap_or_else(|| "r".into()), c.name.clone()))
        });
        assert_eq!(bound.unwrap().to_string(), "r.a = s.b");

        let failed: Result<Expr, String> = e.try_map_columns(&mut |c| Err(c.name.clone()));
        assert_eq!(failed.unwrap_err(), "a");
    }

    #[test]
    fn test_conjuncts_flatten() {
        let e = Expr::And(vec![gt("r", "a", 1), Expr::And(vec![gt("r", "b", 2), gt("r", "c", 3)])]);
        assert_eq!(e.conjuncts().len(), 3);
    }
}

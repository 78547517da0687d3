//! # SELECT-FROM-WHERE Queries
//!
//! [`SfwQuery`] is the parsed form of one query block: the select list, the FROM
//! bindings (`table AS alias`), the WHERE clause in CNF and an optional grouping
//! list. It is immutable once built.
//!
//! [`SfwQuery::optimize`] is the entry point of the crate:
//!
//! 1. **Bind**: resolve every FROM entry through the [`Catalog`], qualify
//!    unqualified column references and validate qualified ones.
//! 2. **Target**: the attributes the plan must produce are the columns used by the
//!    select list and the grouping list.
//! 3. **Search**: run [`ExhaustiveSearch`] over the bound tables in FROM order.
//! 4. **Compact**: keep only the nodes of the winning tree.
//!
//! A query built without a WHERE clause gets the single clause `TRUE`.

use crate::catalog::Catalog;
use crate::cost::Cost;
use crate::error::OptimizeError;
use crate::expr::{Clause, ColumnRef, Expr, ScalarValue};
use crate::plan::{PlanArena, PlanId, PlanTrace};
use crate::schema::{Attribute, Schema, TableRef};
use crate::search::{ExhaustiveSearch, SearchConfig, SearchCounters};
use crate::stats::RelationStats;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One entry of the FROM list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromItem {
    pub table: String,
    pub alias: String,
}

impl FromItem {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

/// A parsed SELECT-FROM-WHERE query.
#[derive(Debug, Clone)]
pub struct SfwQuery {
    select: Vec<Expr>,
    from: Vec<FromItem>,
    cnf: Vec<Clause>,
    group_by: Vec<Expr>,
}

impl SfwQuery {
    pub fn new(select: Vec<Expr>, from: Vec<FromItem>, cnf: Vec<Clause>) -> Self {
        let cnf = if cnf.is_empty() {
            vec![Expr::literal(ScalarValue::Bool(true)).into_clause()]
        } else {
            cnf
        };
        Self {
            select,
            from,
            cnf,
            group_by: Vec::new(),
        }
    }

    pub fn with_grouping(mut self, group_by: Vec<Expr>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn select(&self) -> &[Expr] {
        &self.select
    }

    pub fn from(&self) -> &[FromItem] {
        &self.from
    }

    pub fn cnf(&self) -> &[Clause] {
        &self.cnf
    }

    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    /// Resolve tables and columns against `catalog`.
    pub fn bind(&self, catalog: &dyn Catalog) -> Result<BoundQuery, OptimizeError> {
        if self.from.is_empty() {
            return Err(OptimizeError::NoTables);
        }

        let mut tables: Vec<TableRef> = Vec::with_capacity(self.from.len());
        let mut aliases = HashSet::new();
        for item in &self.from {
            if !aliases.insert(item.alias.as_str()) {
                return Err(OptimizeError::DuplicateAlias(item.alias.clone()));
            }
            let table = catalog
                .get_table(&item.table)
                .ok_or_else(|| OptimizeError::UnknownTable(item.table.clone()))?;
            tables.push(table.alias(item.alias.as_str()));
        }

        let binder = Binder { tables: &tables };
        let select = self
            .select
            .iter()
            .map(|e| binder.bind_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        let group_by = self
            .group_by
            .iter()
            .map(|e| binder.bind_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        let clauses = self
            .cnf
            .iter()
            .map(|c| binder.bind_clause(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut target = Schema::new();
        for col in select.iter().chain(&group_by).flat_map(|e| e.columns()) {
            if let Some(attr) = binder.attribute(col) {
                if !target.attrs().contains(&attr) {
                    target.append(attr);
                }
            }
        }

        Ok(BoundQuery {
            tables,
            target,
            clauses,
            select,
            group_by,
        })
    }

    /// Bind the query and find its cheapest join plan.
    pub fn optimize<S: RelationStats>(
        &self,
        catalog: &dyn Catalog,
        config: &SearchConfig,
    ) -> Result<OptimizedPlan<S>, OptimizeError> {
        let bound = self.bind(catalog)?;
        debug!(
            "Bound query: tables=[{}], target_attrs={}, clauses={}",
            bound
                .tables
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            bound.target.len(),
            bound.clauses.len()
        );

        let mut search: ExhaustiveSearch<S> = ExhaustiveSearch::new(config.clone());
        let outcome = search.optimize(&bound.tables, &bound.target, &bound.clauses)?;
        let counters = search.counters();
        let arena = search.into_arena();
        let explored = arena.len();

        let (arena, root) = match outcome.root {
            Some(root) => {
                let (compacted, root) = arena.compact(root);
                (compacted, Some(root))
            }
            None => (PlanArena::new(), None),
        };
        debug!("Compacted plan arena: {} -> {} nodes", explored, arena.len());

        Ok(OptimizedPlan {
            arena,
            root,
            cost: outcome.cost,
            bound,
            counters,
            root_partitions: outcome.root_partitions,
        })
    }
}

impl fmt::Display for SfwQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Selecting the following:")?;
        for e in &self.select {
            writeln!(f, "\t{}", e)?;
        }
        writeln!(f, "From the following:")?;
        for item in &self.from {
            writeln!(f, "\t{} AS {}", item.table, item.alias)?;
        }
        writeln!(f, "Where the following are true:")?;
        for c in &self.cnf {
            writeln!(f, "\t{}", c)?;
        }
        writeln!(f, "Group using:")?;
        for e in &self.group_by {
            writeln!(f, "\t{}", e)?;
        }
        Ok(())
    }
}

/// A query whose tables and columns have been resolved.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    /// Aliased tables in FROM order.
    pub tables: Vec<TableRef>,
    /// Attributes the plan has to produce.
    pub target: Schema,
    /// CNF clauses with every column qualified.
    pub clauses: Vec<Clause>,
    pub select: Vec<Expr>,
    pub group_by: Vec<Expr>,
}

struct Binder<'a> {
    tables: &'a [TableRef],
}

impl Binder<'_> {
    fn bind_expr(&self, expr: &Expr) -> Result<Expr, OptimizeError> {
        expr.try_map_columns(&mut |col: &ColumnRef| self.qualify(col, expr))
    }

    /// Clauses that are already fully qualified keep their identity.
    fn bind_clause(&self, clause: &Clause) -> Result<Clause, OptimizeError> {
        let bound = self.bind_expr(clause)?;
        if bound == **clause {
            Ok(Arc::clone(clause))
        } else {
            Ok(Arc::new(bound))
        }
    }

    fn qualify(&self, col: &ColumnRef, expr: &Expr) -> Result<ColumnRef, OptimizeError> {
        match col.table.as_deref() {
            Some(alias) => {
                let table = self
                    .tables
                    .iter()
                    .find(|t| t.alias() == alias)
                    .ok_or_else(|| OptimizeError::UnknownAlias {
                        alias: alias.to_string(),
                        expr: expr.to_display_string(),
                    })?;
                if table.table().schema.find(&col.name).is_none() {
                    return Err(OptimizeError::UnknownAttribute {
                        alias: alias.to_string(),
                        attribute: col.name.clone(),
                    });
                }
                Ok(col.clone())
            }
            None => {
                let mut owners = self
                    .tables
                    .iter()
                    .filter(|t| t.table().schema.find(&col.name).is_some());
                match (owners.next(), owners.next()) {
                    (Some(t), None) => Ok(ColumnRef::qualified(t.alias(), col.name.as_str())),
                    (Some(_), Some(_)) => Err(OptimizeError::AmbiguousColumn(col.name.clone())),
                    (None, _) => Err(OptimizeError::UnknownColumn(col.name.clone())),
                }
            }
        }
    }

    /// Qualified attribute for a bound column.
    fn attribute(&self, col: &ColumnRef) -> Option<Attribute> {
        let alias = col.table.as_deref()?;
        let table = self.tables.iter().find(|t| t.alias() == alias)?;
        let attr = table.table().schema.find(&col.name)?;
        Some(Attribute {
            relation: Some(alias.to_string()),
            name: attr.name.clone(),
            ty: attr.ty,
        })
    }
}

/// The result of [`SfwQuery::optimize`].
///
/// `arena` holds exactly the winning tree. Without a feasible plan `root` is `None`
/// and `cost` is infinite.
#[derive(Debug, Clone)]
pub struct OptimizedPlan<S> {
    pub arena: PlanArena<S>,
    pub root: Option<PlanId>,
    pub cost: Cost,
    pub bound: BoundQuery,
    pub counters: SearchCounters,
    pub root_partitions: usize,
}

impl<S: RelationStats> OptimizedPlan<S> {
    pub fn render(&self) -> Option<PlanTrace> {
        self.root.map(|root| self.arena.render(root))
    }

    pub fn shape(&self) -> Option<String> {
        self.root.map(|root| self.arena.shape(root))
    }

    /// Estimated cardinality of the query result.
    pub fn row_count(&self) -> Option<f64> {
        self.root
            .map(|root| self.arena.stats(root).row_count_estimate())
    }
}

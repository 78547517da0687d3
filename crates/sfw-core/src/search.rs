//! # Exhaustive Join-Order Search
//!
//! This module implements the recursive subset-enumeration optimizer. Given a set of
//! aliased tables, the attributes the caller needs and the CNF clauses to apply, it
//! returns the cheapest logical plan over every possible join tree (bushy trees
//! included) together with its cost.
//!
//! ## How It Works
//!
//! - **One table**: a table scan applying every clause. Its cost is the filtered row
//!   count. This is the only case that ends the recursion.
//! - **n tables**: every bipartition of the set is a candidate top-level join. Tables
//!   are indexed by their position in the input and a bitmask selects the left side,
//!   so masks `1..2^n - 1` enumerate all splits. A split and its complement describe
//!   the same bipartition; only the first of the pair is evaluated, which leaves
//!   `2^(n-1) - 1` distinct bipartitions. For each one:
//!     1. classify the clauses into left-local, right-local and cross,
//!     2. project the schema each side has to produce,
//!     3. optimize both sides recursively,
//!     4. estimate the join of the two winners under the cross clauses,
//!     5. cost = left cost + right cost + join cardinality.
//!
//!   The first split reaching the minimum cost wins (strict comparison), so the
//!   result is deterministic for a fixed table order.
//!
//! ## Statistics Along a Path
//!
//! The statistics of a sub-plan returned by the recursion already reflect every
//! clause that was local to that side, because those clauses were handed down and
//! applied somewhere inside it. The join estimate is therefore built directly from
//! the children's snapshots; re-applying the local clauses would count their
//! selectivity twice. Each clause is applied exactly once on any leaf-to-root path.
//!
//! ## Complexity
//!
//! There is no memoization across recursive calls: overlapping subsets are optimized
//! again for every split that produces them. The number of recursive calls follows
//! the ordered Bell numbers (about 7 million at 9 tables, growing roughly 13x per
//! table), so the number of tables is capped by [`SearchConfig::max_tables`].
//!
//! Memory stays proportional to the plans being kept. Each call records where its
//! candidates start in the arena; a losing candidate is truncated away and a new
//! winner replaces the previous one with [`PlanArena::discard`]. After a search the
//! arena holds exactly the winning tree.

use crate::cost::Cost;
use crate::error::OptimizeError;
use crate::expr::Clause;
use crate::partition::{classify_clauses, project_schema};
use crate::plan::{PlanArena, PlanId};
use crate::schema::{Schema, TableRef};
use crate::stats::RelationStats;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Splits are `u64` bitmasks, which bounds the table count independently of config.
pub const MAX_SEARCH_TABLES: usize = 63;

/// Largest table set searched by default; one more table costs roughly 13x the time.
pub const DEFAULT_MAX_TABLES: usize = 9;

/// Configuration knobs for the join search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Largest table set the search accepts. Clamped to [`MAX_SEARCH_TABLES`].
    pub max_tables: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_tables: DEFAULT_MAX_TABLES }
    }
}

impl SearchConfig {
    pub fn table_limit(&self) -> usize {
        self.max_tables.min(MAX_SEARCH_TABLES)
    }
}

/// Work done by a search, accumulated over every call on the same engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCounters {
    /// Invocations of the recursive optimizer, base cases included.
    pub optimize_calls: usize,
    /// Bipartitions evaluated at any level.
    pub splits_evaluated: usize,
    /// Bipartitions skipped because a side had no plan.
    pub infeasible_splits: usize,
}

/// Result of a top-level search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Winning plan in the engine's arena, `None` if no plan exists.
    pub root: Option<PlanId>,
    /// Cost of the winning plan, infinite without a plan.
    pub cost: Cost,
    /// Distinct bipartitions evaluated for the full table set.
    pub root_partitions: usize,
}

/// A costed join of two sub-plans that has not been added to the arena yet.
struct SplitCandidate<S> {
    left: PlanId,
    right: PlanId,
    cross: Vec<Clause>,
    output: Schema,
    stats: S,
    cost: Cost,
}

impl<S> SplitCandidate<S> {
    /// Follow an [`PlanArena::discard`] that removed `gap` nodes just below `from`.
    fn shift_down(&mut self, from: usize, gap: usize) {
        for id in [&mut self.left, &mut self.right] {
            if id.0 >= from {
                id.0 -= gap;
            }
        }
    }
}

/// The exhaustive search engine.
///
/// Owns the arena sub-plans are built in. Losing candidates are rolled back, so each
/// search leaves only its winning tree behind.
pub struct ExhaustiveSearch<S> {
    pub arena: PlanArena<S>,
    pub config: SearchConfig,
    counters: SearchCounters,
}

impl<S: RelationStats> ExhaustiveSearch<S> {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            arena: PlanArena::new(),
            config,
            counters: SearchCounters::default(),
        }
    }

    pub fn counters(&self) -> SearchCounters {
        self.counters
    }

    pub fn into_arena(self) -> PlanArena<S> {
        self.arena
    }

    /// Find the cheapest plan joining `tables`, producing `target` and applying
    /// every clause of `clauses`.
    ///
    /// Table order is significant only for tie-breaking between equally cheap plans.
    pub fn optimize(
        &mut self,
        tables: &[TableRef],
        target: &Schema,
        clauses: &[Clause],
    ) -> Result<SearchOutcome, OptimizeError> {
        self.validate(tables, clauses)?;
        debug!(
            "Starting join search: tables={}, clauses={}, target_attrs={}",
            tables.len(),
            clauses.len(),
            target.len()
        );

        let calls_before = self.counters.optimize_calls;
        let (root, cost, root_partitions) = self.optimize_tables(tables, target, clauses);

        match root {
            Some(id) => debug!(
                "Join search complete: plan={}, cost={}, partitions={}, calls={}",
                self.arena.shape(id),
                cost,
                root_partitions,
                self.counters.optimize_calls - calls_before
            ),
            None => debug!("Join search failed: no valid plan found"),
        }

        Ok(SearchOutcome {
            root,
            cost,
            root_partitions,
        })
    }

    /// Cost of joining `tables` with one fixed top-level split: the tables whose bit
    /// is set in `left_mask` form the left side. Both sides are still optimized
    /// exhaustively. A mask that leaves a side empty yields no plan.
    pub fn evaluate_split(
        &mut self,
        tables: &[TableRef],
        target: &Schema,
        clauses: &[Clause],
        left_mask: u64,
    ) -> Result<(Option<PlanId>, Cost), OptimizeError> {
        self.validate(tables, clauses)?;
        let full = full_mask(tables.len());
        if left_mask == 0 || left_mask & full == full || left_mask & !full != 0 {
            return Ok((None, Cost::infinite()));
        }
        match self.join_split(tables, target, clauses, left_mask) {
            Some(candidate) => {
                let cost = candidate.cost;
                let id = self.materialize(tables, candidate);
                Ok((Some(id), cost))
            }
            None => Ok((None, Cost::infinite())),
        }
    }

    /// Reject input the search cannot handle correctly.
    fn validate(&self, tables: &[TableRef], clauses: &[Clause]) -> Result<(), OptimizeError> {
        if tables.is_empty() {
            return Err(OptimizeError::NoTables);
        }
        let limit = self.config.table_limit();
        if tables.len() > limit {
            return Err(OptimizeError::TooManyTables {
                count: tables.len(),
                limit,
            });
        }

        let mut aliases = HashSet::new();
        for t in tables {
            if !aliases.insert(t.alias()) {
                return Err(OptimizeError::DuplicateAlias(t.alias().to_string()));
            }
        }

        // A clause naming an alias outside the table set would silently end up as a
        // cross clause at the root; surface it instead.
        for clause in clauses {
            for col in clause.columns() {
                match col.table.as_deref() {
                    None => {
                        return Err(OptimizeError::UnqualifiedColumn {
                            column: col.name.clone(),
                            expr: clause.to_display_string(),
                        })
                    }
                    Some(alias) if !aliases.contains(alias) => {
                        return Err(OptimizeError::UnknownAlias {
                            alias: alias.to_string(),
                            expr: clause.to_display_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// The recursive optimizer. Returns the winning plan, its cost and the number of
    /// distinct bipartitions tried for this table set.
    fn optimize_tables(
        &mut self,
        tables: &[TableRef],
        target: &Schema,
        clauses: &[Clause],
    ) -> (Option<PlanId>, Cost, usize) {
        self.counters.optimize_calls += 1;

        if let [table] = tables {
            let (id, cost) = self.plan_scan(table, target, clauses);
            return (Some(id), cost, 0);
        }

        let full = full_mask(tables.len());
        let mut tried: HashSet<u64> = HashSet::new();
        let mut best: Option<SplitCandidate<S>> = None;
        let mut best_cost = Cost::infinite();
        // Nodes in base..arena.len() belong to the current best; nothing else past base.
        let base = self.arena.len();

        for mask in 1..full {
            // A split and its complement are the same bipartition.
            let canonical = mask.min(full ^ mask);
            if !tried.insert(canonical) {
                continue;
            }

            let mark = self.arena.len();
            let Some(mut candidate) = self.join_split(tables, target, clauses, mask) else {
                self.arena.truncate(mark);
                continue;
            };

            if candidate.cost.beats(&best_cost) {
                trace!(
                    "  New best for {{{}}}: {} | {} cost={}",
                    aliases_of(tables).join(","),
                    self.arena.shape(candidate.left),
                    self.arena.shape(candidate.right),
                    candidate.cost
                );
                self.arena.discard(base, mark);
                candidate.shift_down(mark, mark - base);
                best_cost = candidate.cost;
                best = Some(candidate);
            } else {
                self.arena.truncate(mark);
            }
        }

        let partitions = tried.len();
        match best {
            Some(candidate) => {
                let id = self.materialize(tables, candidate);
                (Some(id), best_cost, partitions)
            }
            None => (None, Cost::infinite(), partitions),
        }
    }

    /// Base case: scan one table, applying every clause handed down to it.
    fn plan_scan(&mut self, table: &TableRef, target: &Schema, clauses: &[Clause]) -> (PlanId, Cost) {
        let stats = S::from_table(table).estimate_selection(clauses);
        let cost = Cost::scan(stats.row_count_estimate());
        let output = project_schema(std::slice::from_ref(table), target, &[]);
        trace!(
            "Scan {} with {} clause(s): rows={:.1}",
            table,
            clauses.len(),
            stats.row_count_estimate()
        );
        let id = self.arena.add_scan(table.clone(), output, clauses.to_vec(), Arc::new(stats));
        (id, cost)
    }

    /// Optimize both sides of one split and cost their join.
    fn join_split(
        &mut self,
        tables: &[TableRef],
        target: &Schema,
        clauses: &[Clause],
        left_mask: u64,
    ) -> Option<SplitCandidate<S>> {
        self.counters.splits_evaluated += 1;

        let (left, right) = split_tables(tables, left_mask);
        let buckets = classify_clauses(clauses, &left, &right);
        let left_schema = project_schema(&left, target, &buckets.cross);
        let right_schema = project_schema(&right, target, &buckets.cross);

        let (left_plan, left_cost, _) = self.optimize_tables(&left, &left_schema, &buckets.left);
        let (right_plan, right_cost, _) = self.optimize_tables(&right, &right_schema, &buckets.right);

        let (Some(left_plan), Some(right_plan)) = (left_plan, right_plan) else {
            self.counters.infeasible_splits += 1;
            trace!(
                "Split {{{}}} | {{{}}} infeasible",
                aliases_of(&left).join(","),
                aliases_of(&right).join(",")
            );
            return None;
        };

        // Child snapshots already include their local clauses.
        let left_stats = Arc::clone(self.arena.stats(left_plan));
        let right_stats = Arc::clone(self.arena.stats(right_plan));
        let stats = left_stats.estimate_join(&buckets.cross, &right_stats);
        let cost = Cost::join(left_cost, right_cost, stats.row_count_estimate());

        trace!(
            "Split {{{}}} | {{{}}}: cross={}, rows={:.1}, cost={}",
            aliases_of(&left).join(","),
            aliases_of(&right).join(","),
            buckets.cross.len(),
            stats.row_count_estimate(),
            cost
        );

        Some(SplitCandidate {
            left: left_plan,
            right: right_plan,
            cross: buckets.cross,
            output: project_schema(tables, target, &[]),
            stats,
            cost,
        })
    }

    fn materialize(&mut self, tables: &[TableRef], candidate: SplitCandidate<S>) -> PlanId {
        let name = format!("join({})", aliases_of(tables).join(","));
        self.arena.add_join(
            candidate.left,
            candidate.right,
            name,
            candidate.output,
            candidate.cross,
            Arc::new(candidate.stats),
        )
    }
}

/// Mask with the low `n` bits set.
fn full_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Split `tables` by `mask`: bit i set sends table i to the left. Order is kept.
fn split_tables(tables: &[TableRef], mask: u64) -> (Vec<TableRef>, Vec<TableRef>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (i, t) in tables.iter().enumerate() {
        if mask & (1u64 << i) != 0 {
            left.push(t.clone());
        } else {
            right.push(t.clone());
        }
    }
    (left, right)
}

fn aliases_of(tables: &[TableRef]) -> Vec<&str> {
    tables.iter().map(|t| t.alias()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, ColumnRef, Expr, ScalarValue};
    use crate::schema::{AttrType, Table};
    use crate::stats::Statistics;

    fn tables(n: usize) -> Vec<TableRef> {
        (0..n)
            .map(|i| {
                let name = format!("t{}", i);
                Arc::new(Table::new(&name, Schema::new().with_attr("k", AttrType::Int), 10.0 * (i + 1) as f64))
                    .alias(name)
            })
            .collect()
    }

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.max_tables, DEFAULT_MAX_TABLES);
        assert_eq!(SearchConfig { max_tables: 500 }.table_limit(), MAX_SEARCH_TABLES);
    }

    #[test]
    fn test_full_mask_and_split() {
        assert_eq!(full_mask(3), 0b111);
        let ts = tables(3);
        let (l, r) = split_tables(&ts, 0b101);
        assert_eq!(aliases_of(&l), vec!["t0", "t2"]);
        assert_eq!(aliases_of(&r), vec!["t1"]);
    }

    #[test]
    fn test_root_visits_each_bipartition_once() {
        for n in 2..=6 {
            let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
            let outcome = search.optimize(&tables(n), &Schema::new(), &[]).unwrap();
            assert_eq!(outcome.root_partitions, (1usize << (n - 1)) - 1, "n = {}", n);
            assert!(outcome.root.is_some());
        }
    }

    #[test]
    fn test_arena_keeps_only_the_winning_tree() {
        for n in 1..=7 {
            let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
            let outcome = search.optimize(&tables(n), &Schema::new(), &[]).unwrap();
            let root = outcome.root.expect("plan");
            assert_eq!(search.arena.len(), 2 * n - 1, "n = {}", n);
            assert_eq!(search.arena.preorder(root).len(), 2 * n - 1);
            assert_eq!(root, PlanId(2 * n - 2));
        }
    }

    #[test]
    fn test_rollback_preserves_the_best_plan() {
        // a chain with a selective middle join, so the best split is not the first one
        let ts = tables(4);
        let eq = |a: usize, b: usize| {
            Expr::binary(
                BinaryOp::Eq,
                Expr::column(&format!("t{}", a), "k"),
                Expr::column(&format!("t{}", b), "k"),
            )
            .into_clause()
        };
        let clauses = vec![eq(0, 1), eq(1, 2), eq(2, 3)];

        let mut rolled: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
        let outcome = rolled.optimize(&ts, &Schema::new(), &clauses).unwrap();
        let root = outcome.root.expect("plan");
        assert_eq!(rolled.arena.len(), 7);

        // every clause is still applied exactly once in the surviving tree
        let applied = rolled.arena.applied_clauses(root);
        assert_eq!(applied.len(), clauses.len());
        for c in &clauses {
            assert_eq!(applied.iter().filter(|(_, a)| crate::expr::same_clause(a, c)).count(), 1);
        }

        // and no fixed top-level split beats it
        let full = full_mask(ts.len());
        for mask in 1..full {
            let mut fixed: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
            let (_, cost) = fixed.evaluate_split(&ts, &Schema::new(), &clauses, mask).unwrap();
            assert!(!cost.beats(&outcome.cost), "mask {:b}", mask);
        }
    }

    #[test]
    fn test_overflowing_cross_product_still_has_a_plan() {
        let ts: Vec<TableRef> = ["l", "r"]
            .iter()
            .map(|name| Arc::new(Table::new(*name, Schema::new().with_attr("k", AttrType::Int), 1e200)).alias(*name))
            .collect();
        let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
        let outcome = search.optimize(&ts, &Schema::new(), &[]).unwrap();
        assert!(outcome.root.is_some());
        assert!(!outcome.cost.is_infinite());
        assert_eq!(outcome.cost.total, f64::MAX);
        assert_eq!(search.counters().infeasible_splits, 0);
    }

    #[test]
    fn test_single_table_is_a_scan() {
        let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
        let outcome = search.optimize(&tables(1), &Schema::new(), &[]).unwrap();
        assert_eq!(outcome.root_partitions, 0);
        assert_eq!(outcome.cost, Cost::new(10.0));
        assert_eq!(search.counters().optimize_calls, 1);
        assert_eq!(search.counters().splits_evaluated, 0);
    }

    #[test]
    fn test_validation_errors() {
        let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig { max_tables: 2 });

        assert_eq!(search.optimize(&[], &Schema::new(), &[]).unwrap_err(), OptimizeError::NoTables);
        assert_eq!(
            search.optimize(&tables(3), &Schema::new(), &[]).unwrap_err(),
            OptimizeError::TooManyTables { count: 3, limit: 2 }
        );

        let ts = tables(1);
        let dup = vec![ts[0].clone(), ts[0].clone()];
        assert_eq!(
            search.optimize(&dup, &Schema::new(), &[]).unwrap_err(),
            OptimizeError::DuplicateAlias("t0".into())
        );

        let stray = Expr::binary(BinaryOp::Eq, Expr::column("nope", "k"), Expr::literal(ScalarValue::Int64(1)))
            .into_clause();
        assert!(matches!(
            search.optimize(&ts, &Schema::new(), &[stray]).unwrap_err(),
            OptimizeError::UnknownAlias { alias, .. } if alias == "nope"
        ));

        let bare = Expr::binary(
            BinaryOp::Eq,
            Expr::Column(ColumnRef::unqualified("k")),
            Expr::literal(ScalarValue::Int64(1)),
        )
        .into_clause();
        assert!(matches!(
            search.optimize(&ts, &Schema::new(), &[bare]).unwrap_err(),
            OptimizeError::UnqualifiedColumn { .. }
        ));
    }

    #[test]
    fn test_evaluate_split_rejects_degenerate_masks() {
        let mut search: ExhaustiveSearch<Statistics> = ExhaustiveSearch::new(SearchConfig::default());
        let ts = tables(3);
        for mask in [0, 0b111, 0b1000] {
            let (plan, cost) = search.evaluate_split(&ts, &Schema::new(), &[], mask).unwrap();
            assert!(plan.is_none());
            assert!(cost.is_infinite());
        }
        let (plan, cost) = search.evaluate_split(&ts, &Schema::new(), &[], 0b001).unwrap();
        assert!(plan.is_some());
        assert!(!cost.is_infinite());
    }
}

//! # Logical Plan Nodes
//!
//! A logical plan is a tree of table scans and joins. Nodes live in a [`PlanArena`]
//! and refer to their children by [`PlanId`]; a node is immutable once added and its
//! statistics snapshot is fixed at construction. Every child is owned by exactly one
//! parent in the plans the optimizer returns (see [`PlanArena::compact`]).
//!
//! ## Rendering
//!
//! [`PlanArena::render`] does not print anything. It produces a [`PlanTrace`]: a
//! depth-indexed pre-order list of nodes (kind, output table, estimated rows, applied
//! predicates) plus the flat list of every table the plan touches. Callers decide how
//! to show it; `PlanTrace` implements `Display` for the console and `Serialize` for
//! the HTTP service.

use crate::expr::{Clause, Expr};
use crate::schema::{Schema, TableRef};
use crate::stats::RelationStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Index of a node inside its [`PlanArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub usize);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind discriminant of a plan node (without data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    TableScan,
    Join,
    Aggregate,
}

/// Logical plan node.
#[derive(Debug, Clone)]
pub enum PlanNode<S> {
    /// Scan of one aliased base table, applying every clause local to it.
    TableScan {
        table: TableRef,
        output: Schema,
        predicates: Vec<Clause>,
        stats: Arc<S>,
    },
    /// Join of two sub-plans, applying the clauses that span both.
    Join {
        left: PlanId,
        right: PlanId,
        output_name: String,
        output: Schema,
        predicates: Vec<Clause>,
        stats: Arc<S>,
    },
    /// Grouping on top of a plan. Reserved: the join search never produces it.
    Aggregate {
        input: PlanId,
        output_name: String,
        group_by: Vec<Expr>,
        output: Schema,
        stats: Arc<S>,
    },
}

impl<S> PlanNode<S> {
    pub fn kind(&self) -> NodeKind {
        match self {
            PlanNode::TableScan { .. } => NodeKind::TableScan,
            PlanNode::Join { .. } => NodeKind::Join,
            PlanNode::Aggregate { .. } => NodeKind::Aggregate,
        }
    }

    pub fn stats(&self) -> &Arc<S> {
        match self {
            PlanNode::TableScan { stats, .. }
            | PlanNode::Join { stats, .. }
            | PlanNode::Aggregate { stats, .. } => stats,
        }
    }

    pub fn output_schema(&self) -> &Schema {
        match self {
            PlanNode::TableScan { output, .. }
            | PlanNode::Join { output, .. }
            | PlanNode::Aggregate { output, .. } => output,
        }
    }

    /// Clauses applied by this node.
    pub fn predicates(&self) -> &[Clause] {
        match self {
            PlanNode::TableScan { predicates, .. } | PlanNode::Join { predicates, .. } => predicates,
            PlanNode::Aggregate { .. } => &[],
        }
    }

    pub fn children(&self) -> Vec<PlanId> {
        match self {
            PlanNode::TableScan { .. } => vec![],
            PlanNode::Join { left, right, .. } => vec![*left, *right],
            PlanNode::Aggregate { input, .. } => vec![*input],
        }
    }

    /// Name of the relation this node produces.
    pub fn output_name(&self) -> &str {
        match self {
            PlanNode::TableScan { table, .. } => table.alias(),
            PlanNode::Join { output_name, .. } | PlanNode::Aggregate { output_name, .. } => output_name,
        }
    }

    /// Move child ids at or past `from` down by `gap`.
    fn shift_children(&mut self, from: usize, gap: usize) {
        let shift = |id: &mut PlanId| {
            if id.0 >= from {
                id.0 -= gap;
            }
        };
        match self {
            PlanNode::TableScan { .. } => {}
            PlanNode::Join { left, right, .. } => {
                shift(left);
                shift(right);
            }
            PlanNode::Aggregate { input, .. } => shift(input),
        }
    }

    fn with_children(&self, children: &[PlanId]) -> Self
    where
        S: Clone,
    {
        let mut node = self.clone();
        match &mut node {
            PlanNode::TableScan { .. } => {}
            PlanNode::Join { left, right, .. } => {
                *left = children[0];
                *right = children[1];
            }
            PlanNode::Aggregate { input, .. } => *input = children[0],
        }
        node
    }
}

/// Where a traced node hangs below its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Left,
    Right,
    Input,
}

/// One node of a rendered plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub depth: usize,
    pub role: Role,
    pub kind: NodeKind,
    pub output_table: String,
    /// Base table read by a scan.
    pub input_table: Option<String>,
    pub row_count: f64,
    pub predicates: Vec<String>,
    pub output_attributes: Vec<String>,
}

/// Structured rendering of a plan tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTrace {
    /// Pre-order, parents before children, left before right.
    pub nodes: Vec<TraceEntry>,
    /// Every table identity touched, in the order the plan creates them.
    pub tables: Vec<String>,
}

impl fmt::Display for PlanTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.nodes {
            let pad = "  ".repeat(entry.depth);
            if entry.depth > 0 {
                let parent_pad = "  ".repeat(entry.depth - 1);
                match entry.role {
                    Role::Left => writeln!(f, "{}  ** Left tree:", parent_pad)?,
                    Role::Right => writeln!(f, "{}  ** Right tree:", parent_pad)?,
                    Role::Input => writeln!(f, "{}  ** Input:", parent_pad)?,
                    Role::Root => {}
                }
            }
            let label = match entry.kind {
                NodeKind::TableScan => "TABLE SCAN",
                NodeKind::Join => "JOIN",
                NodeKind::Aggregate => "AGGREGATE",
            };
            writeln!(f, "{}****** {} returning {:.1} tuples.", pad, label, entry.row_count)?;
            writeln!(f, "{}  ** Output table: {}", pad, entry.output_table)?;
            if let Some(input) = &entry.input_table {
                writeln!(f, "{}  ** Input table: {}", pad, input)?;
            }
            writeln!(f, "{}  ** Predicates:", pad)?;
            for p in &entry.predicates {
                writeln!(f, "{}    {}", pad, p)?;
            }
        }
        writeln!(f, "\nAll tables created:")?;
        for t in &self.tables {
            writeln!(f, "Table: {}", t)?;
        }
        Ok(())
    }
}

/// Storage for plan nodes. Ids are positions; nodes are only removed from the tail
/// or by [`PlanArena::discard`], which renumbers what follows.
#[derive(Debug, Clone)]
pub struct PlanArena<S> {
    nodes: Vec<PlanNode<S>>,
}

impl<S> Default for PlanArena<S> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<S> PlanArena<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: PlanNode<S>) -> PlanId {
        let id = PlanId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Drop every node added at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    /// Remove the nodes in `start..end` and shift every later node down to fill the
    /// gap. No node at or past `end` may refer into the removed range.
    pub fn discard(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let gap = end - start;
        self.nodes.drain(start..end);
        for node in &mut self.nodes[start..] {
            node.shift_children(end, gap);
        }
    }

    /// Panics if `id` was not issued by this arena.
    pub fn node(&self, id: PlanId) -> &PlanNode<S> {
        &self.nodes[id.0]
    }

    pub fn stats(&self, id: PlanId) -> &Arc<S> {
        self.node(id).stats()
    }

    pub fn add_scan(&mut self, table: TableRef, output: Schema, predicates: Vec<Clause>, stats: Arc<S>) -> PlanId {
        self.add(PlanNode::TableScan {
            table,
            output,
            predicates,
            stats,
        })
    }

    pub fn add_join(
        &mut self,
        left: PlanId,
        right: PlanId,
        output_name: String,
        output: Schema,
        predicates: Vec<Clause>,
        stats: Arc<S>,
    ) -> PlanId {
        self.add(PlanNode::Join {
            left,
            right,
            output_name,
            output,
            predicates,
            stats,
        })
    }

    pub fn add_aggregate(&mut self, input: PlanId, group_by: Vec<Expr>, output: Schema, stats: Arc<S>) -> PlanId {
        let output_name = format!("group({})", self.node(input).output_name());
        self.add(PlanNode::Aggregate {
            input,
            output_name,
            group_by,
            output,
            stats,
        })
    }

    /// Node ids of the tree rooted at `root`, in pre-order.
    pub fn preorder(&self, root: PlanId) -> Vec<PlanId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            // push right first so that left is visited first
            for child in self.node(id).children().into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Every clause applied in the tree, each paired with the node applying it.
    pub fn applied_clauses(&self, root: PlanId) -> Vec<(PlanId, Clause)> {
        self.preorder(root)
            .into_iter()
            .flat_map(|id| self.node(id).predicates().iter().map(move |c| (id, c.clone())))
            .collect()
    }

    /// Compact join-order notation, e.g. `((r ⋈ s) ⋈ t)`.
    pub fn shape(&self, root: PlanId) -> String {
        match self.node(root) {
            PlanNode::TableScan { table, .. } => table.alias().to_string(),
            PlanNode::Join { left, right, .. } => {
                format!("({} ⋈ {})", self.shape(*left), self.shape(*right))
            }
            PlanNode::Aggregate { input, .. } => format!("γ{}", self.shape(*input)),
        }
    }

    /// Copy the tree rooted at `root` into a fresh arena holding nothing else.
    ///
    /// Children are copied before their parents, so ids in the new arena are a
    /// post-order numbering of the tree.
    pub fn compact(&self, root: PlanId) -> (PlanArena<S>, PlanId)
    where
        S: Clone,
    {
        let mut out = PlanArena::new();
        let mut remap: HashMap<PlanId, PlanId> = HashMap::new();
        let new_root = self.copy_into(root, &mut out, &mut remap);
        (out, new_root)
    }

    fn copy_into(&self, id: PlanId, out: &mut PlanArena<S>, remap: &mut HashMap<PlanId, PlanId>) -> PlanId
    where
        S: Clone,
    {
        if let Some(done) = remap.get(&id) {
            return *done;
        }
        let node = self.node(id);
        let children: Vec<PlanId> = node
            .children()
            .into_iter()
            .map(|c| self.copy_into(c, out, remap))
            .collect();
        let new_id = out.add(node.with_children(&children));
        remap.insert(id, new_id);
        new_id
    }
}

impl<S: RelationStats> PlanArena<S> {
    /// Render the tree rooted at `root` as structured trace data.
    pub fn render(&self, root: PlanId) -> PlanTrace {
        let mut trace = PlanTrace::default();
        self.render_node(root, 0, Role::Root, &mut trace);
        trace
    }

    fn render_node(&self, id: PlanId, depth: usize, role: Role, trace: &mut PlanTrace) {
        let node = self.node(id);
        let input_table = match node {
            PlanNode::TableScan { table, .. } => Some(table.table().name.clone()),
            _ => None,
        };
        trace.nodes.push(TraceEntry {
            depth,
            role,
            kind: node.kind(),
            output_table: node.output_name().to_string(),
            input_table: input_table.clone(),
            row_count: node.stats().row_count_estimate(),
            predicates: node.predicates().iter().map(|p| p.to_display_string()).collect(),
            output_attributes: node
                .output_schema()
                .attrs()
                .iter()
                .map(|a| match &a.relation {
                    Some(r) => format!("{}.{}", r, a.name),
                    None => a.name.clone(),
                })
                .collect(),
        });

        match node {
            PlanNode::TableScan { .. } => {}
            PlanNode::Join { left, right, .. } => {
                self.render_node(*left, depth + 1, Role::Left, trace);
                self.render_node(*right, depth + 1, Role::Right, trace);
            }
            PlanNode::Aggregate { input, .. } => {
                self.render_node(*input, depth + 1, Role::Input, trace);
            }
        }

        trace.tables.push(node.output_name().to_string());
        if let Some(input) = input_table {
            if input != node.output_name() {
                trace.tables.push(input);
            }
        }
    }
}

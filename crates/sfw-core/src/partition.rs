//! # Predicate Classification and Schema Projection
//!
//! Every candidate join splits the current table set into a left and a right side.
//! Two questions have to be answered for each split before the sides can be
//! optimized on their own:
//!
//! - **Which clauses belong where?** A clause that only touches tables on one side is
//!   pushed down into that side. Everything else (clauses spanning both sides, and
//!   constant clauses that touch no table at all) is a *cross* clause and is applied
//!   by the join that creates the split. Each clause lands in exactly one bucket, so
//!   along any root-to-leaf path every clause is applied exactly once.
//!
//! - **Which attributes must each side produce?** Only the attributes the caller
//!   asked for plus the ones the cross clauses still need. Attributes consumed solely
//!   by pushed-down clauses are dropped, which keeps intermediate relations narrow.

use crate::expr::Clause;
use crate::schema::{Schema, TableRef};

/// Clauses of one split, partitioned by where they are applied.
#[derive(Debug, Clone, Default)]
pub struct ClauseBuckets {
    /// Applied inside the left side.
    pub left: Vec<Clause>,
    /// Applied inside the right side.
    pub right: Vec<Clause>,
    /// Applied by the join of the two sides.
    pub cross: Vec<Clause>,
}

impl ClauseBuckets {
    pub fn len(&self) -> usize {
        self.left.len() + self.right.len() + self.cross.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn touches(clause: &Clause, side: &[TableRef]) -> bool {
    side.iter().any(|t| clause.references_table(t.alias()))
}

/// Classify `clauses` against the `left`/`right` split. Input order is preserved
/// within each bucket.
pub fn classify_clauses(clauses: &[Clause], left: &[TableRef], right: &[TableRef]) -> ClauseBuckets {
    let mut buckets = ClauseBuckets::default();
    for clause in clauses {
        match (touches(clause, left), touches(clause, right)) {
            (true, false) => buckets.left.push(clause.clone()),
            (false, true) => buckets.right.push(clause.clone()),
            // Both sides, or neither: never dropped, applied at this join.
            _ => buckets.cross.push(clause.clone()),
        }
    }
    buckets
}

/// Attributes of `side` that must survive: those in `target` and those referenced by
/// a cross clause. Table order, then attribute order, is preserved.
pub fn project_schema(side: &[TableRef], target: &Schema, cross: &[Clause]) -> Schema {
    let mut projected = Schema::new();
    for table in side {
        let alias = table.alias();
        for attr in table.schema().attrs() {
            let needed = target.contains(alias, &attr.name)
                || cross.iter().any(|c| c.references_attribute(alias, &attr.name));
            if needed {
                projected.append(attr.clone());
            }
        }
    }
    projected
}

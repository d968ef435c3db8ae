//! The algebraic simplifier: equality-term propagation, operand converse,
//! pair reduction, LIKE-to-range, RANGE construction and merging, IS NULL
//! folding, and three-valued constant folding, each run to a fixed point
//! over WHERE and HAVING independently.

mod between;
mod converse;
pub(crate) mod fold;
mod null_fold;
mod propagate;
mod range;

pub(crate) use fold::where_folds_false;

use crate::{Clause, RewriteContext, RewritePass};
use requel_common::{RewriteResult, Transformed};
use requel_model::NodeId;

/// Steps cannot enable each other forever; this only guards against a
/// pathological ping-pong.
const MAX_ROUNDS: usize = 8;

#[derive(Debug, Default)]
pub struct AlgebraicSimplifier;

impl RewritePass for AlgebraicSimplifier {
    fn name(&self) -> &str {
        "algebraic-simplifier"
    }

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>> {
        let mut changed = false;
        for clause in [Clause::Where, Clause::Having] {
            changed |= simplify_clause(ctx, stmt, clause)?.transformed;
        }
        Ok(Transformed::new((), changed))
    }
}

/// Runs the simplifier steps in their documented order until the clause
/// stops changing.
pub(crate) fn simplify_clause(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut any = false;
    for _ in 0..MAX_ROUNDS {
        let mut changed = false;
        changed |= propagate::apply(ctx, stmt, clause)?.transformed;
        changed |= fold::fold_constants(ctx, stmt, clause)?;
        changed |= fold::dedup_conjuncts(ctx, stmt, clause)?;
        changed |= converse::apply(ctx, stmt, clause)?.transformed;
        changed |= between::reduce_pairs(ctx, stmt, clause)?.transformed;
        changed |= between::like_to_range(ctx, stmt, clause)?.transformed;
        changed |= range::construct(ctx, stmt, clause)?.transformed;
        changed |= range::merge_and_intersect(ctx, stmt, clause)?.transformed;
        changed |= null_fold::apply(ctx, stmt, clause)?.transformed;
        if !changed {
            break;
        }
        any = true;
    }
    Ok(Transformed::new((), any))
}

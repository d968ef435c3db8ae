//! IS NULL / IS NOT NULL folding against redundant predicates.
//!
//! A conjunct that constrains an attribute to concrete values cannot hold
//! for a NULL, so a coexisting `IS NULL` at the same location makes the
//! location FALSE, and a coexisting `IS NOT NULL` is redundant.

use crate::simplify::fold::collapse_false;
use crate::{clause_head, set_clause_head, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::{ExprOp, NodeArena, NodeId};

pub(crate) fn apply(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));

    // IS NULL against any constraint (including IS NOT NULL): FALSE.
    for &conjunct in &ids {
        let Some(attr) = null_test_attr(ctx.arena, conjunct, ExprOp::IsNull) else {
            continue;
        };
        let location = ctx.arena[conjunct].location;
        let constrained = ids.iter().any(|&other| {
            other != conjunct
                && ctx.arena[other].location == location
                && (constrains(ctx.arena, other, attr)
                    || null_test_attr(ctx.arena, other, ExprOp::IsNotNull)
                        .is_some_and(|a| ctx.arena.trees_equal(a, attr)))
        });
        if constrained {
            collapse_false(ctx, stmt, clause, location)?;
            return Ok(Transformed::yes(()));
        }
    }

    // IS NOT NULL next to a value constraint is redundant.
    let mut removed = Vec::new();
    for &conjunct in &ids {
        let Some(attr) = null_test_attr(ctx.arena, conjunct, ExprOp::IsNotNull) else {
            continue;
        };
        let location = ctx.arena[conjunct].location;
        let constrained = ids.iter().any(|&other| {
            other != conjunct
                && !removed.contains(&other)
                && ctx.arena[other].location == location
                && constrains(ctx.arena, other, attr)
        });
        if constrained {
            removed.push(conjunct);
        }
    }
    if removed.is_empty() {
        return Ok(Transformed::no(()));
    }
    let kept: Vec<NodeId> = ids.into_iter().filter(|id| !removed.contains(id)).collect();
    let head = ctx.arena.relink(&kept);
    set_clause_head(ctx.arena, stmt, clause, head);
    Ok(Transformed::yes(()))
}

/// The operand of a lone `attr IS [NOT] NULL` conjunct.
fn null_test_attr(arena: &NodeArena, conjunct: NodeId, op: ExprOp) -> Option<NodeId> {
    if arena[conjunct].or_next.is_some() {
        return None;
    }
    let expr = arena[conjunct].as_expr()?;
    (expr.op == op).then_some(expr.arg1).flatten()
}

/// Whether a lone conjunct constrains `attr` to concrete values: a
/// null-rejecting predicate with `attr` as one of its operand trees.
fn constrains(arena: &NodeArena, conjunct: NodeId, attr: NodeId) -> bool {
    if arena[conjunct].or_next.is_some() {
        return false;
    }
    let Some(expr) = arena[conjunct].as_expr() else {
        return false;
    };
    if matches!(expr.op, ExprOp::IsNull | ExprOp::IsNotNull) || !expr.op.is_null_rejecting() {
        return false;
    }
    if expr.flags.empty_range {
        return false;
    }
    let mut operands = vec![expr.arg1];
    if expr.op.is_comparison() {
        operands.push(expr.arg2);
    }
    operands
        .into_iter()
        .flatten()
        .any(|operand| arena.trees_equal(operand, attr))
}

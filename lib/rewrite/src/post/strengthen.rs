//! Outer-to-inner join strengthening.
//!
//! A WHERE conjunct that can only hold when the outer side produced a real
//! row makes the outer join equivalent to an inner join. The reference
//! must be "plain": inside comparisons, arithmetic or paths, but not
//! behind a function call that could absorb a NULL.

use crate::{select_parts, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::{ExprOp, JoinType, NodeArena, NodeId, NodeKind, Select, SpecId, ValueData};

pub(crate) fn strengthen_outer_joins(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    let specs = ctx.arena.list(select.from);
    let mut changed = false;

    for (i, &spec_node) in specs.iter().enumerate() {
        let Some(spec) = ctx.arena[spec_node].as_spec() else {
            continue;
        };
        if !spec.join_type.is_outer() {
            continue;
        }
        if !where_kills_nulls(ctx.arena, &select, spec.id) {
            continue;
        }
        if let Some(spec) = ctx.arena[spec_node].as_spec_mut() {
            spec.join_type = JoinType::Inner;
        }
        changed = true;
        // The chain of RIGHT OUTER joins hanging off this spec preserved
        // rows that are now filtered anyway.
        for &later in &specs[i + 1..] {
            let is_right = ctx.arena[later]
                .as_spec()
                .is_some_and(|s| s.join_type == JoinType::RightOuter);
            if !is_right {
                break;
            }
            if let Some(spec) = ctx.arena[later].as_spec_mut() {
                spec.join_type = JoinType::Inner;
            }
        }
    }
    Ok(Transformed::new((), changed))
}

/// A top-level, lone, null-rejecting conjunct with a plain reference to
/// the spec.
fn where_kills_nulls(arena: &NodeArena, select: &Select, spec_id: SpecId) -> bool {
    arena.list(select.where_clause).into_iter().any(|conjunct| {
        if arena[conjunct].location != 0 || arena[conjunct].or_next.is_some() {
            return false;
        }
        let Some(expr) = arena[conjunct].as_expr() else {
            return false;
        };
        if expr.op == ExprOp::IsNull || !expr.op.is_null_rejecting() {
            return false;
        }
        if expr.flags.full_range {
            return false;
        }
        has_plain_ref(arena, conjunct, spec_id)
    })
}

/// A reference to the spec reached without crossing a function call or a
/// subquery boundary; on such paths NULL propagates to the predicate.
fn has_plain_ref(arena: &NodeArena, id: NodeId, spec_id: SpecId) -> bool {
    match &arena[id].kind {
        NodeKind::Name(name) => name.spec_id == spec_id,
        NodeKind::Expr(expr) => [expr.arg1, expr.arg2, expr.arg3]
            .into_iter()
            .flatten()
            .any(|a| has_plain_ref(arena, a, spec_id)),
        NodeKind::Dot(dot) => {
            has_plain_ref(arena, dot.arg1, spec_id) || has_plain_ref(arena, dot.arg2, spec_id)
        }
        NodeKind::Value(value) => match &value.data {
            ValueData::Set(elements) => elements
                .iter()
                .any(|&e| has_plain_ref(arena, e, spec_id)),
            _ => false,
        },
        _ => false,
    }
}

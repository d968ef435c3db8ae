//! Inner-join unordering.
//!
//! Explicit INNER JOINs constrain the planner's join order for no
//! semantic reason; demoting them to plain FROM entries frees it. The
//! pass stops at the first outer-joined spec (those chains stay as
//! written) and is suppressed entirely by an ORDERED hint. Predicates
//! that belonged to a demoted join lose their location and become
//! indistinguishable from WHERE.

use crate::join::set_location_deep;
use crate::{clause_head, select_parts, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::{JoinType, NodeId};

pub(crate) fn unorder_inner_joins(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    if select.ordered_hint {
        return Ok(Transformed::no(()));
    }
    let mut changed = false;
    for spec_node in ctx.arena.list(select.from) {
        let Some(spec) = ctx.arena[spec_node].as_spec() else {
            continue;
        };
        if spec.join_type.is_outer() {
            break;
        }
        if spec.join_type != JoinType::Inner {
            continue;
        }
        if let Some(spec) = ctx.arena[spec_node].as_spec_mut() {
            spec.join_type = JoinType::None;
        }
        let location = ctx.arena[spec_node].location;
        reset_location(ctx, stmt, location);
        changed = true;
    }
    Ok(Transformed::new((), changed))
}

fn reset_location(ctx: &mut RewriteContext<'_>, stmt: NodeId, location: u32) {
    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, Clause::Where)) {
        if ctx.arena[conjunct].location == location {
            set_location_deep(ctx.arena, conjunct, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_common::EmptySchema;
    use requel_model::AstBuilder;

    #[test]
    fn inner_joins_demote_and_locations_reset() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let ta = b.name(t, "a");
        let ub = b.name(u, "b");
        let pred = b.eq(ub, ta);
        b.arena[pred].location = 2;
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::Inner, u, vec![])
            .predicate(pred)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        unorder_inner_joins(&mut ctx, select).unwrap();
        assert_eq!(arena[u].as_spec().unwrap().join_type, JoinType::None);
        assert_eq!(arena[pred].location, 0);
        assert_eq!(arena.sql(select), "SELECT t.a FROM t, u WHERE u.b = t.a");
    }

    #[test]
    fn ordered_hint_pins_the_written_order() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::Inner, u, vec![])
            .ordered()
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        unorder_inner_joins(&mut ctx, select).unwrap();
        assert_eq!(arena[u].as_spec().unwrap().join_type, JoinType::Inner);
    }

    #[test]
    fn specs_after_an_outer_join_stay_as_written() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let v = b.class_spec("v", "v");
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::LeftOuter, u, vec![])
            .join(JoinType::Inner, v, vec![])
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        unorder_inner_joins(&mut ctx, select).unwrap();
        assert_eq!(arena[v].as_spec().unwrap().join_type, JoinType::Inner);
    }
}

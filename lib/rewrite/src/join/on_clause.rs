//! ON-clause lifting and restoration.
//!
//! Lifting moves every spec's ON condition into WHERE, tagging each
//! conjunct with the spec's location so restoration can undo the move
//! after the other passes ran. A spec demoted to inner in between keeps
//! its predicates in WHERE at location 0.

use crate::{select_parts, RewriteContext};
use requel_common::{RewriteError, RewriteResult, Transformed};
use requel_model::visit::{for_each_node, WalkScope};
use requel_model::{JoinType, NodeArena, NodeId, NodeKind, SpecId};
use rustc_hash::FxHashMap;

pub(crate) fn lift_on_conditions(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    let specs = ctx.arena.list(select.from);
    let positions: FxHashMap<SpecId, usize> = specs
        .iter()
        .enumerate()
        .filter_map(|(i, &s)| ctx.arena[s].as_spec().map(|spec| (spec.id, i)))
        .collect();

    let mut where_head = select.where_clause;
    let mut changed = false;
    for (i, &spec_node) in specs.iter().enumerate() {
        let Some(spec) = ctx.arena[spec_node].as_spec() else {
            continue;
        };
        let Some(on_head) = spec.on_cond else {
            continue;
        };
        let join_type = spec.join_type;
        let location = ctx.arena[spec_node].location;

        for conjunct in ctx.arena.list(Some(on_head)) {
            if join_type.is_outer() {
                check_placement(ctx.arena, conjunct, &positions, i)?;
            }
            set_location_deep(ctx.arena, conjunct, location);
        }
        where_head = ctx.arena.concat(where_head, Some(on_head));
        if let Some(spec) = ctx.arena[spec_node].as_spec_mut() {
            spec.on_cond = None;
        }
        changed = true;
    }
    if let Some(select) = ctx.arena[stmt].as_select_mut() {
        select.where_clause = where_head;
    }
    Ok(Transformed::new((), changed))
}

/// An outer join's ON condition may only reference specs up to its own
/// position; anything further right is a user error, reported with a
/// snippet.
fn check_placement(
    arena: &NodeArena,
    conjunct: NodeId,
    positions: &FxHashMap<SpecId, usize>,
    position: usize,
) -> RewriteResult<()> {
    let mut misplaced = false;
    for_each_node(arena, conjunct, WalkScope::IntoQueries, &mut |_, node| {
        if let NodeKind::Name(name) = &node.kind {
            if positions.get(&name.spec_id).is_some_and(|&p| p > position) {
                misplaced = true;
            }
        }
    });
    if misplaced {
        return Err(RewriteError::OuterJoinMisplacement {
            snippet: arena.sql(conjunct),
        });
    }
    Ok(())
}

pub(crate) fn set_location_deep(arena: &mut NodeArena, conjunct: NodeId, location: u32) {
    arena[conjunct].location = location;
    for or_id in arena.or_list(arena[conjunct].or_next) {
        arena[or_id].location = location;
    }
}

/// Walks WHERE once more and re-attaches each located conjunct to the
/// outer-joined spec with the same location. Conjuncts whose spec was
/// demoted in the meantime stay in WHERE at location 0; COPYPUSH copies
/// are dropped outright.
pub(crate) fn restore_on_conditions(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    let outer_by_location: FxHashMap<u32, NodeId> = ctx
        .arena
        .list(select.from)
        .into_iter()
        .filter(|&s| {
            ctx.arena[s]
                .as_spec()
                .is_some_and(|spec| spec.join_type.is_outer())
        })
        .map(|s| (ctx.arena[s].location, s))
        .collect();

    let mut kept = Vec::new();
    let mut restored: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    let mut changed = false;
    for conjunct in ctx.arena.list(select.where_clause) {
        let is_copy = ctx.arena[conjunct]
            .as_expr()
            .is_some_and(|e| e.flags.copy_push);
        if is_copy {
            changed = true;
            continue;
        }
        let location = ctx.arena[conjunct].location;
        if location == 0 {
            kept.push(conjunct);
            continue;
        }
        match outer_by_location.get(&location) {
            Some(&spec_node) => {
                restored.entry(spec_node).or_default().push(conjunct);
                changed = true;
            }
            None => {
                set_location_deep(ctx.arena, conjunct, 0);
                kept.push(conjunct);
                changed = true;
            }
        }
    }

    let head = ctx.arena.relink(&kept);
    if let Some(select) = ctx.arena[stmt].as_select_mut() {
        select.where_clause = head;
    }
    for (spec_node, conjuncts) in restored {
        let on_head = ctx.arena.relink(&conjuncts);
        if let Some(spec) = ctx.arena[spec_node].as_spec_mut() {
            spec.on_cond = on_head;
        }
    }
    Ok(Transformed::new((), changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_common::EmptySchema;
    use requel_model::AstBuilder;

    #[test]
    fn lift_and_restore_round_trip() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let ta = b.name(t, "a");
        let ub = b.name(u, "b");
        let on = b.eq(ub, ta);
        let ta2 = b.name(t, "a");
        let five = b.int(5);
        let where_pred = b.gt(ta2, five);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::LeftOuter, u, vec![on])
            .predicate(where_pred)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);

        lift_on_conditions(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t LEFT OUTER JOIN u WHERE t.a > 5 AND u.b = t.a"
        );
        assert_eq!(arena[on].location, 2);

        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        restore_on_conditions(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t LEFT OUTER JOIN u ON u.b = t.a WHERE t.a > 5"
        );
    }

    #[test]
    fn restore_clears_locations_of_demoted_specs() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let ta = b.name(t, "a");
        let ub = b.name(u, "b");
        let on = b.eq(ub, ta);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::LeftOuter, u, vec![on])
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        lift_on_conditions(&mut ctx, select).unwrap();

        // Strengthening demoted the join in the meantime.
        if let Some(spec) = arena[u].as_spec_mut() {
            spec.join_type = JoinType::Inner;
        }
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        restore_on_conditions(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t INNER JOIN u WHERE u.b = t.a"
        );
        assert_eq!(arena[on].location, 0);
    }

    #[test]
    fn outer_on_referencing_a_later_spec_errors() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let v = b.class_spec("v", "v");
        let ub = b.name(u, "b");
        let vc = b.name(v, "c");
        let on = b.eq(ub, vc);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(JoinType::LeftOuter, u, vec![on])
            .join(JoinType::None, v, vec![])
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        let err = lift_on_conditions(&mut ctx, select).unwrap_err();
        assert_eq!(
            err,
            RewriteError::OuterJoinMisplacement {
                snippet: "u.b = v.c".into()
            }
        );
    }
}

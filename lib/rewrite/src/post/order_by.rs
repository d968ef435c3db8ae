//! ORDER BY reduction and its merge with GROUP BY.

use crate::{select_parts, RewriteContext};
use requel_common::{RewriteError, RewriteResult, Transformed};
use requel_model::visit::replace_op;
use requel_model::{ExprOp, NodeArena, NodeId, NodeKind, SortSpec};

pub(crate) fn reduce_order_by(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    if select.order_by.is_none() {
        return Ok(Transformed::no(()));
    }
    let mut changed = false;

    // Constant items order nothing.
    let mut items = Vec::new();
    for item in ctx.arena.list(select.order_by) {
        let Some(sort) = ctx.arena[item].as_sort_spec() else {
            continue;
        };
        let is_const = sort.pos.is_none()
            && matches!(ctx.arena[sort.expr].kind, NodeKind::Value(_));
        if is_const {
            changed = true;
        } else {
            items.push(item);
        }
    }

    // Repeated columns merge when the directions agree and reject the
    // query when they conflict.
    let mut deduped: Vec<NodeId> = Vec::with_capacity(items.len());
    for item in items {
        let Some(sort) = ctx.arena[item].as_sort_spec().cloned() else {
            continue;
        };
        let earlier = deduped.iter().find_map(|&seen| {
            let seen_sort = ctx.arena[seen].as_sort_spec()?;
            same_sort_target(ctx.arena, seen_sort, &sort).then_some(seen_sort)
        });
        match earlier {
            Some(seen_sort) if seen_sort.asc == sort.asc => changed = true,
            Some(_) => {
                return Err(RewriteError::SortDirectionConflict {
                    column: ctx.arena.sql(sort.expr),
                });
            }
            None => deduped.push(item),
        }
    }

    // An ORDER BY that is a prefix of GROUP BY adds nothing: grouped
    // output already arrives in group order.
    let droppable = !deduped.is_empty()
        && select.group_by.is_some()
        && select.orderby_for.is_none()
        && !select.distinct
        && select.having.is_none()
        && is_group_by_prefix(ctx.arena, &deduped, select.group_by);
    if droppable {
        deduped.clear();
        changed = true;
        for item in ctx.arena.list(select.list) {
            replace_op(ctx.arena, item, ExprOp::OrderbyNum, ExprOp::GroupbyNum);
        }
    }

    if changed {
        let head = ctx.arena.relink(&deduped);
        if let Some(select) = ctx.arena[stmt].as_select_mut() {
            select.order_by = head;
        }
    }
    Ok(Transformed::new((), changed))
}

fn same_sort_target(arena: &NodeArena, a: &SortSpec, b: &SortSpec) -> bool {
    match (a.pos, b.pos) {
        (Some(x), Some(y)) => x == y,
        _ => arena.trees_equal(a.expr, b.expr),
    }
}

fn is_group_by_prefix(
    arena: &NodeArena,
    order_items: &[NodeId],
    group_by: Option<NodeId>,
) -> bool {
    let group_items = arena.list(group_by);
    if order_items.len() > group_items.len() {
        return false;
    }
    order_items.iter().zip(&group_items).all(|(&o, &g)| {
        let (Some(os), Some(gs)) = (arena[o].as_sort_spec(), arena[g].as_sort_spec()) else {
            return false;
        };
        os.asc == gs.asc && arena.trees_equal(os.expr, gs.expr)
    })
}

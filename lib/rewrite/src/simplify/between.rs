//! Comparison pair reduction (`a >= x AND a <= y` to BETWEEN) and the
//! LIKE-to-range family of rewrites.

use crate::simplify::fold::{collapse_false, const_value};
use crate::{clause_head, set_clause_head, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::{
    BetweenVariant, DataTypeDescriptor, ExprOp, NodeArena, NodeId, NodeKind, SqlType, ValueData,
};
use std::cmp::Ordering;

/// Merges an upper- and a lower-bound comparison over the same attribute
/// at the same location into one BETWEEN with the matching openness
/// variant. Bounds proven contradictory collapse the location to FALSE.
pub(crate) fn reduce_pairs(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;
    loop {
        let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));
        let Some((lower, upper)) = find_pair(ctx.arena, &ids) else {
            break;
        };
        changed = true;

        let location = ctx.arena[lower].location;
        let (lower_strict, lower_bound) = bound_of(ctx.arena, lower);
        let (upper_strict, upper_bound) = bound_of(ctx.arena, upper);

        // Constant bounds in the wrong order make the conjunct FALSE.
        if let (Some(lo), Some(hi)) = (
            lower_bound.and_then(|b| const_value(ctx.arena, b)),
            upper_bound.and_then(|b| const_value(ctx.arena, b)),
        ) {
            let empty = match lo.compare(&hi) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => lower_strict || upper_strict,
                _ => false,
            };
            if empty {
                collapse_false(ctx, stmt, clause, location)?;
                continue;
            }
        }

        let variant = BetweenVariant::from_bounds(Some(lower_strict), Some(upper_strict))
            .unwrap_or(BetweenVariant::GeLe);
        if let Some(expr) = ctx.arena[lower].as_expr_mut() {
            expr.op = ExprOp::Between(variant);
            expr.arg2 = lower_bound;
            expr.arg3 = upper_bound;
        }
        let kept: Vec<NodeId> = ctx
            .arena
            .list(clause_head(ctx.arena, stmt, clause))
            .into_iter()
            .filter(|&c| c != upper)
            .collect();
        let head = ctx.arena.relink(&kept);
        set_clause_head(ctx.arena, stmt, clause, head);
    }
    Ok(Transformed::new((), changed))
}

/// A (lower-bound, upper-bound) conjunct pair over the same attribute.
fn find_pair(arena: &NodeArena, ids: &[NodeId]) -> Option<(NodeId, NodeId)> {
    for (i, &a) in ids.iter().enumerate() {
        if !is_single_bound(arena, a) {
            continue;
        }
        for &b in &ids[i + 1..] {
            if !is_single_bound(arena, b) {
                continue;
            }
            if arena[a].location != arena[b].location {
                continue;
            }
            let (Some(ea), Some(eb)) = (arena[a].as_expr(), arena[b].as_expr()) else {
                continue;
            };
            let (Some(attr_a), Some(attr_b)) = (ea.arg1, eb.arg1) else {
                continue;
            };
            if !arena.trees_equal(attr_a, attr_b) {
                continue;
            }
            let a_is_lower = matches!(ea.op, ExprOp::Gt | ExprOp::Ge);
            let b_is_lower = matches!(eb.op, ExprOp::Gt | ExprOp::Ge);
            match (a_is_lower, b_is_lower) {
                (true, false) => return Some((a, b)),
                (false, true) => return Some((b, a)),
                _ => {}
            }
        }
    }
    None
}

fn is_single_bound(arena: &NodeArena, conjunct: NodeId) -> bool {
    arena[conjunct].or_next.is_none()
        && arena[conjunct]
            .expr_op()
            .is_some_and(ExprOp::is_rangeable)
}

fn bound_of(arena: &NodeArena, conjunct: NodeId) -> (bool, Option<NodeId>) {
    match arena[conjunct].as_expr() {
        Some(expr) => (
            matches!(expr.op, ExprOp::Gt | ExprOp::Lt),
            expr.arg2,
        ),
        None => (false, None),
    }
}

/// LIKE rewrites over constant patterns: `'%'` to IS NOT NULL, wildcardless
/// patterns to equality, and pure prefix patterns to a half-open BETWEEN.
pub(crate) fn like_to_range(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;
    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
        for disjunct in ctx.arena.or_list(Some(conjunct)) {
            changed |= rewrite_like(ctx, disjunct)?;
        }
    }
    Ok(Transformed::new((), changed))
}

fn rewrite_like(ctx: &mut RewriteContext<'_>, disjunct: NodeId) -> RewriteResult<bool> {
    let Some(expr) = ctx.arena[disjunct].as_expr() else {
        return Ok(false);
    };
    if expr.op != ExprOp::Like || expr.arg3.is_some() {
        return Ok(false);
    }
    let (Some(_attr), Some(pattern_id)) = (expr.arg1, expr.arg2) else {
        return Ok(false);
    };
    let Some(ValueData::Str(mut pattern)) = const_pattern(ctx.arena, pattern_id) else {
        return Ok(false);
    };

    // Consecutive percent signs match exactly what a single one does.
    let mut collapsed = false;
    while pattern.contains("%%") {
        pattern = pattern.replace("%%", "%");
        collapsed = true;
    }
    if collapsed {
        if let NodeKind::Value(value) = &mut ctx.arena[pattern_id].kind {
            value.data = ValueData::Str(pattern.clone());
        }
    }

    if pattern == "%" {
        if let Some(expr) = ctx.arena[disjunct].as_expr_mut() {
            expr.op = ExprOp::IsNotNull;
            expr.arg2 = None;
        }
        return Ok(true);
    }

    if !pattern.contains(['%', '_']) {
        // CHAR padding makes `=` and LIKE disagree on trailing spaces;
        // decline that corner.
        if pattern.ends_with(' ') {
            return Ok(collapsed);
        }
        if let Some(expr) = ctx.arena[disjunct].as_expr_mut() {
            expr.op = ExprOp::Eq;
        }
        return Ok(true);
    }

    let prefix = match pattern.strip_suffix('%') {
        Some(prefix) if !prefix.is_empty() && !prefix.contains(['%', '_']) => prefix,
        _ => return Ok(collapsed),
    };
    let Some(upper) = increment_last_char(prefix) else {
        return Ok(collapsed);
    };

    let lower_id = new_string(ctx, prefix)?;
    let upper_id = new_string(ctx, &upper)?;
    if let Some(expr) = ctx.arena[disjunct].as_expr_mut() {
        expr.op = ExprOp::Between(BetweenVariant::GeLt);
        expr.arg2 = Some(lower_id);
        expr.arg3 = Some(upper_id);
    }
    Ok(true)
}

fn const_pattern(arena: &NodeArena, id: NodeId) -> Option<ValueData> {
    match &arena[id].kind {
        NodeKind::Value(value) => Some(value.data.clone()),
        _ => None,
    }
}

/// The smallest string greater than every string with this prefix, built
/// by bumping the final character. Non-ASCII tails decline.
fn increment_last_char(prefix: &str) -> Option<String> {
    let last = prefix.chars().last()?;
    if !last.is_ascii() || last as u32 >= 0x7f {
        return None;
    }
    let bumped = char::from_u32(last as u32 + 1)?;
    let mut out = String::with_capacity(prefix.len());
    out.push_str(&prefix[..prefix.len() - last.len_utf8()]);
    out.push(bumped);
    Some(out)
}

fn new_string(ctx: &mut RewriteContext<'_>, s: &str) -> RewriteResult<NodeId> {
    let id = ctx
        .arena
        .new_value(ValueData::Str(s.into()), SqlType::VarChar)?;
    ctx.arena[id].data_type = Some(DataTypeDescriptor::precision(
        u16::try_from(s.len()).unwrap_or(u16::MAX),
    ));
    Ok(id)
}

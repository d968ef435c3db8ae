//! Canonical RANGE nodes: construction from comparison/IN/BETWEEN
//! disjunctions, union merge inside one RANGE, and intersection of RANGEs
//! across conjuncts on the same attribute.
//!
//! Bounds are classified with a five-valued comparator over
//! (value, openness) pairs; two between specs merge whenever their
//! boundary comparison is not strictly disjoint. The merge and intersect
//! results keep the identities `merge(R) = R` and `intersect(R, R) = R`.

use crate::simplify::fold::{collapse_false, const_value};
use crate::{clause_head, set_clause_head, Clause, RewriteContext};
use itertools::Itertools;
use requel_common::{RewriteResult, Transformed};
use requel_model::{
    BetweenVariant, Expr, ExprOp, NameMetaClass, NodeArena, NodeId, NodeKind, ValueData,
};
use std::cmp::Ordering;

/// One endpoint: `value: None` is the infinite side.
#[derive(Clone, Copy, Debug)]
struct Bound {
    value: Option<NodeId>,
    open: bool,
}

#[derive(Clone, Copy, Debug)]
struct Interval {
    lower: Bound,
    upper: Bound,
}

/// Outcome of comparing two endpoints as (value, openness) pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundCmp {
    LessDisjoint,
    LessAdjacent,
    Equal,
    GreaterAdjacent,
    GreaterDisjoint,
}

pub(crate) fn construct(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));

    // First pass: which conjuncts are convertible at all, and over which
    // attribute.
    let mut convertible = Vec::new();
    for &conjunct in &ids {
        if let Some(attr) = convertible_attr(ctx.arena, conjunct) {
            convertible.push((conjunct, attr));
        }
    }

    let mut changed = false;
    for &(conjunct, attr) in &convertible {
        if ctx.arena[conjunct].expr_op() == Some(ExprOp::Range) {
            continue;
        }
        if !should_convert(ctx.arena, &convertible, conjunct, attr) {
            continue;
        }
        let Some(intervals) = conjunct_intervals(ctx.arena, conjunct) else {
            continue;
        };
        let location = ctx.arena[conjunct].location;
        let chain = build_chain(ctx, &intervals)?;
        if let Some(expr) = ctx.arena[conjunct].as_expr_mut() {
            expr.op = ExprOp::Range;
            expr.arg1 = Some(attr);
            expr.arg2 = chain;
            expr.arg3 = None;
        }
        ctx.arena[conjunct].or_next = None;
        ctx.arena[conjunct].location = location;
        changed = true;
    }
    Ok(Transformed::new((), changed))
}

/// Conversion policy: disjunction chains and IN lists always become
/// RANGEs; a lone comparison or BETWEEN converts only when another
/// convertible conjunct on the same attribute and location exists, so the
/// pair can intersect.
fn should_convert(
    arena: &NodeArena,
    convertible: &[(NodeId, NodeId)],
    conjunct: NodeId,
    attr: NodeId,
) -> bool {
    if arena[conjunct].or_next.is_some() {
        return true;
    }
    match arena[conjunct].expr_op() {
        Some(ExprOp::In) => return true,
        // Rewriter-made BETWEENs (LIKE prefixes, merged pairs) go straight
        // to range form; only the parser's `BETWEEN lo AND hi` stays.
        Some(ExprOp::Between(variant)) if variant != BetweenVariant::And => return true,
        _ => {}
    }
    convertible.iter().any(|&(other, other_attr)| {
        other != conjunct
            && arena[other].location == arena[conjunct].location
            && arena.trees_equal(other_attr, attr)
    })
}

/// The attribute all disjuncts of the conjunct range over, if the whole
/// disjunction is convertible.
fn convertible_attr(arena: &NodeArena, conjunct: NodeId) -> Option<NodeId> {
    let mut attr: Option<NodeId> = None;
    for disjunct in arena.or_list(Some(conjunct)) {
        let (d_attr, _) = disjunct_intervals(arena, disjunct)?;
        match attr {
            None => attr = Some(d_attr),
            Some(seen) if arena.trees_equal(seen, d_attr) => {}
            Some(_) => return None,
        }
    }
    attr
}

fn conjunct_intervals(arena: &NodeArena, conjunct: NodeId) -> Option<Vec<Interval>> {
    let mut out = Vec::new();
    for disjunct in arena.or_list(Some(conjunct)) {
        let (_, intervals) = disjunct_intervals(arena, disjunct)?;
        out.extend(intervals);
    }
    Some(out)
}

/// The (attribute, intervals) reading of one disjunct, or `None` when it
/// is not a sargable comparison over constants.
fn disjunct_intervals(arena: &NodeArena, disjunct: NodeId) -> Option<(NodeId, Vec<Interval>)> {
    let expr = arena[disjunct].as_expr()?;
    let attr = expr.arg1?;
    if !is_sargable_attr(arena, attr) {
        return None;
    }
    let intervals = match expr.op {
        ExprOp::Eq => vec![point(is_bound(arena, expr.arg2?)?)],
        ExprOp::Lt => vec![upper_only(is_bound(arena, expr.arg2?)?, true)],
        ExprOp::Le => vec![upper_only(is_bound(arena, expr.arg2?)?, false)],
        ExprOp::Gt => vec![lower_only(is_bound(arena, expr.arg2?)?, true)],
        ExprOp::Ge => vec![lower_only(is_bound(arena, expr.arg2?)?, false)],
        ExprOp::Between(variant) => {
            let variant = if variant == BetweenVariant::And {
                BetweenVariant::GeLe
            } else {
                variant
            };
            let lower = if variant.has_lower() {
                Bound {
                    value: Some(is_bound(arena, expr.arg2?)?),
                    open: variant.lower_open(),
                }
            } else {
                Bound {
                    value: None,
                    open: true,
                }
            };
            let upper = if variant.has_upper() {
                let id = if variant.has_lower() {
                    expr.arg3?
                } else {
                    expr.arg2?
                };
                Bound {
                    value: Some(is_bound(arena, id)?),
                    open: variant.upper_open(),
                }
            } else {
                Bound {
                    value: None,
                    open: true,
                }
            };
            vec![Interval { lower, upper }]
        }
        ExprOp::In => {
            let NodeKind::Value(value) = &arena[expr.arg2?].kind else {
                return None;
            };
            let ValueData::Set(elements) = &value.data else {
                return None;
            };
            elements
                .iter()
                .map(|&e| is_bound(arena, e).map(point))
                .collect::<Option<Vec<_>>>()?
        }
        ExprOp::Range => {
            let mut out = Vec::new();
            for spec in arena.or_list(expr.arg2) {
                let spec_expr = arena[spec].as_expr()?;
                let ExprOp::RangeSpec(variant) = spec_expr.op else {
                    return None;
                };
                out.push(spec_interval(variant, spec_expr.arg1, spec_expr.arg2)?);
            }
            out
        }
        _ => return None,
    };
    Some((attr, intervals))
}

fn spec_interval(
    variant: BetweenVariant,
    arg1: Option<NodeId>,
    arg2: Option<NodeId>,
) -> Option<Interval> {
    if variant == BetweenVariant::EqNa {
        return Some(point(arg1?));
    }
    let lower = if variant.has_lower() {
        Bound {
            value: Some(arg1?),
            open: variant.lower_open(),
        }
    } else {
        Bound {
            value: None,
            open: true,
        }
    };
    let upper = if variant.has_upper() {
        Bound {
            value: Some(arg2?),
            open: variant.upper_open(),
        }
    } else {
        Bound {
            value: None,
            open: true,
        }
    };
    Some(Interval { lower, upper })
}

fn point(value: NodeId) -> Interval {
    let bound = Bound {
        value: Some(value),
        open: false,
    };
    Interval {
        lower: bound,
        upper: bound,
    }
}

fn lower_only(value: NodeId, open: bool) -> Interval {
    Interval {
        lower: Bound {
            value: Some(value),
            open,
        },
        upper: Bound {
            value: None,
            open: true,
        },
    }
}

fn upper_only(value: NodeId, open: bool) -> Interval {
    Interval {
        lower: Bound {
            value: None,
            open: true,
        },
        upper: Bound {
            value: Some(value),
            open,
        },
    }
}

fn is_sargable_attr(arena: &NodeArena, id: NodeId) -> bool {
    matches!(
        &arena[id].kind,
        NodeKind::Name(name)
            if matches!(name.meta_class, NameMetaClass::Normal | NameMetaClass::OidAttr)
    )
}

/// Bounds are literal values or host variables; NULL literals decline.
fn is_bound(arena: &NodeArena, id: NodeId) -> Option<NodeId> {
    match &arena[id].kind {
        NodeKind::HostVar(_) => Some(id),
        NodeKind::Value(value) if !value.data.is_null() => Some(id),
        NodeKind::Expr(_) if const_value(arena, id).is_some() => Some(id),
        _ => None,
    }
}

// ---- merge and intersect ----------------------------------------------

/// Unions overlapping or adjacent between specs inside each RANGE, then
/// intersects RANGEs over the same attribute across conjuncts. An empty
/// intersection flags EMPTY_RANGE and collapses the location to FALSE.
pub(crate) fn merge_and_intersect(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;

    // Union pass, one RANGE at a time.
    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
        changed |= merge_one(ctx, conjunct)?;
    }

    // Intersection pass across conjuncts.
    let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));
    let mut dropped: Vec<NodeId> = Vec::new();
    for (i, &a) in ids.iter().enumerate() {
        if dropped.contains(&a) || !is_intersectable_range(ctx.arena, a) {
            continue;
        }
        for &b in &ids[i + 1..] {
            if dropped.contains(&b) || !is_intersectable_range(ctx.arena, b) {
                continue;
            }
            if ctx.arena[a].location != ctx.arena[b].location {
                continue;
            }
            let (attr_a, attr_b) = match (range_attr(ctx.arena, a), range_attr(ctx.arena, b)) {
                (Some(x), Some(y)) => (x, y),
                _ => continue,
            };
            if !ctx.arena.trees_equal(attr_a, attr_b) {
                continue;
            }
            let (Some(iv_a), Some(iv_b)) = (
                const_intervals(ctx.arena, a),
                const_intervals(ctx.arena, b),
            ) else {
                continue;
            };
            let result = intersect(ctx.arena, &iv_a, &iv_b);
            changed = true;
            if result.is_empty() {
                if let Some(expr) = ctx.arena[a].as_expr_mut() {
                    expr.flags.empty_range = true;
                }
                let location = ctx.arena[a].location;
                collapse_false(ctx, stmt, clause, location)?;
                return Ok(Transformed::yes(()));
            }
            let chain = build_chain(ctx, &result)?;
            if let Some(expr) = ctx.arena[a].as_expr_mut() {
                expr.arg2 = chain;
            }
            dropped.push(b);
        }
    }

    if !dropped.is_empty() {
        let kept: Vec<NodeId> = ids.into_iter().filter(|id| !dropped.contains(id)).collect();
        let head = ctx.arena.relink(&kept);
        set_clause_head(ctx.arena, stmt, clause, head);
    }
    Ok(Transformed::new((), changed))
}

fn is_intersectable_range(arena: &NodeArena, conjunct: NodeId) -> bool {
    arena[conjunct].or_next.is_none()
        && matches!(
            arena[conjunct].as_expr(),
            Some(e) if e.op == ExprOp::Range && !e.flags.full_range && !e.flags.empty_range
        )
}

fn range_attr(arena: &NodeArena, conjunct: NodeId) -> Option<NodeId> {
    arena[conjunct].as_expr().and_then(|e| e.arg1)
}

/// The RANGE's intervals when every bound is a comparable constant.
fn const_intervals(arena: &NodeArena, conjunct: NodeId) -> Option<Vec<Interval>> {
    let expr = arena[conjunct].as_expr()?;
    let mut out = Vec::new();
    for spec in arena.or_list(expr.arg2) {
        let spec_expr = arena[spec].as_expr()?;
        let ExprOp::RangeSpec(variant) = spec_expr.op else {
            return None;
        };
        let interval = spec_interval(variant, spec_expr.arg1, spec_expr.arg2)?;
        for bound in [interval.lower, interval.upper] {
            if let Some(v) = bound.value {
                const_value(arena, v)?;
            }
        }
        out.push(interval);
    }
    Some(out)
}

/// Union-merges the between-spec chain of one RANGE conjunct.
fn merge_one(ctx: &mut RewriteContext<'_>, conjunct: NodeId) -> RewriteResult<bool> {
    let Some(expr) = ctx.arena[conjunct].as_expr() else {
        return Ok(false);
    };
    if expr.op != ExprOp::Range || ctx.arena.or_list(expr.arg2).len() < 2 {
        return Ok(false);
    }
    let Some(intervals) = conjunct_intervals(ctx.arena, conjunct) else {
        return Ok(false);
    };

    let (consts, others): (Vec<Interval>, Vec<Interval>) = intervals
        .into_iter()
        .partition(|iv| interval_is_const(ctx.arena, iv));

    let sorted = consts
        .into_iter()
        .sorted_by(|a, b| cmp_lower(ctx.arena, &a.lower, &b.lower))
        .collect::<Vec<_>>();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    let mut became_full = false;
    let mut changed = false;
    for interval in sorted {
        let Some(current) = merged.last_mut() else {
            merged.push(interval);
            continue;
        };
        let relation = classify(ctx.arena, &current.upper, &interval.lower);
        let mergeable = !matches!(relation, BoundCmp::LessDisjoint);
        if !mergeable {
            merged.push(interval);
            continue;
        }
        let new_upper = max_upper(ctx.arena, &current.upper, &interval.upper);
        if current.lower.value.is_none() && new_upper.value.is_none() {
            // No variant expresses (-inf, +inf); keep the pieces and mark
            // the term as covering the whole domain.
            became_full = true;
            merged.push(interval);
            continue;
        }
        current.upper = new_upper;
        changed = true;
    }
    merged.extend(others);

    if became_full {
        if let Some(expr) = ctx.arena[conjunct].as_expr_mut() {
            expr.flags.full_range = true;
        }
        changed = true;
    }
    if !changed {
        return Ok(false);
    }
    let chain = build_chain(ctx, &merged)?;
    if let Some(expr) = ctx.arena[conjunct].as_expr_mut() {
        expr.arg2 = chain;
    }
    Ok(true)
}

fn interval_is_const(arena: &NodeArena, interval: &Interval) -> bool {
    [interval.lower, interval.upper].iter().all(|b| {
        b.value.map_or(true, |v| const_value(arena, v).is_some())
    })
}

fn intersect(arena: &NodeArena, a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    for x in a {
        for y in b {
            let lower = max_lower(arena, &x.lower, &y.lower);
            let upper = min_upper(arena, &x.upper, &y.upper);
            if interval_nonempty(arena, &lower, &upper) {
                out.push(Interval { lower, upper });
            }
        }
    }
    out
}

fn interval_nonempty(arena: &NodeArena, lower: &Bound, upper: &Bound) -> bool {
    let (Some(l), Some(u)) = (lower.value, upper.value) else {
        return true;
    };
    match cmp_values(arena, l, u) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => !lower.open && !upper.open,
        _ => false,
    }
}

// ---- bound arithmetic --------------------------------------------------

fn cmp_values(arena: &NodeArena, a: NodeId, b: NodeId) -> Option<Ordering> {
    let va = const_value(arena, a)?;
    let vb = const_value(arena, b)?;
    va.compare(&vb)
}

/// Five-valued comparison of an upper endpoint against a lower endpoint.
/// Anything but `LessDisjoint` means the two intervals touch.
fn classify(arena: &NodeArena, upper: &Bound, lower: &Bound) -> BoundCmp {
    let (Some(u), Some(l)) = (upper.value, lower.value) else {
        return BoundCmp::GreaterDisjoint;
    };
    match cmp_values(arena, u, l) {
        Some(Ordering::Less) => BoundCmp::LessDisjoint,
        Some(Ordering::Greater) => BoundCmp::GreaterDisjoint,
        Some(Ordering::Equal) => match (upper.open, lower.open) {
            (false, false) => BoundCmp::Equal,
            (false, true) => BoundCmp::GreaterAdjacent,
            (true, false) => BoundCmp::LessAdjacent,
            // Both endpoints exclude the value: a one-point gap.
            (true, true) => BoundCmp::LessDisjoint,
        },
        None => BoundCmp::LessDisjoint,
    }
}

fn cmp_lower(arena: &NodeArena, a: &Bound, b: &Bound) -> Ordering {
    match (a.value, b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match cmp_values(arena, x, y) {
            Some(Ordering::Equal) => match (a.open, b.open) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                _ => Ordering::Equal,
            },
            Some(ord) => ord,
            None => Ordering::Equal,
        },
    }
}

fn max_upper(arena: &NodeArena, a: &Bound, b: &Bound) -> Bound {
    match (a.value, b.value) {
        (None, _) => *a,
        (_, None) => *b,
        (Some(x), Some(y)) => match cmp_values(arena, x, y) {
            Some(Ordering::Greater) => *a,
            Some(Ordering::Less) => *b,
            _ => {
                if a.open {
                    *b
                } else {
                    *a
                }
            }
        },
    }
}

fn max_lower(arena: &NodeArena, a: &Bound, b: &Bound) -> Bound {
    match (a.value, b.value) {
        (None, _) => *b,
        (_, None) => *a,
        (Some(x), Some(y)) => match cmp_values(arena, x, y) {
            Some(Ordering::Greater) => *a,
            Some(Ordering::Less) => *b,
            _ => {
                if a.open {
                    *a
                } else {
                    *b
                }
            }
        },
    }
}

fn min_upper(arena: &NodeArena, a: &Bound, b: &Bound) -> Bound {
    match (a.value, b.value) {
        (None, _) => *b,
        (_, None) => *a,
        (Some(x), Some(y)) => match cmp_values(arena, x, y) {
            Some(Ordering::Less) => *a,
            Some(Ordering::Greater) => *b,
            _ => {
                if a.open {
                    *a
                } else {
                    *b
                }
            }
        },
    }
}

/// Materializes an interval list as an `or_next` chain of between specs.
/// Bound nodes are copied so no node lands in two chains.
fn build_chain(
    ctx: &mut RewriteContext<'_>,
    intervals: &[Interval],
) -> RewriteResult<Option<NodeId>> {
    let mut specs = Vec::with_capacity(intervals.len());
    for interval in intervals {
        let is_point = match (interval.lower.value, interval.upper.value) {
            (Some(l), Some(u)) => {
                !interval.lower.open
                    && !interval.upper.open
                    && (l == u || cmp_values(ctx.arena, l, u) == Some(Ordering::Equal))
            }
            _ => false,
        };
        let spec = if is_point {
            let value = ctx.arena.copy_tree(
                interval
                    .lower
                    .value
                    .unwrap_or_else(|| unreachable!("point interval has a value")),
            )?;
            ctx.arena.new_expr(Expr::unary(
                ExprOp::RangeSpec(BetweenVariant::EqNa),
                value,
            ))?
        } else {
            let variant = BetweenVariant::from_bounds(
                interval.lower.value.map(|_| interval.lower.open),
                interval.upper.value.map(|_| interval.upper.open),
            );
            let Some(variant) = variant else {
                continue;
            };
            let lower = match interval.lower.value {
                Some(v) => Some(ctx.arena.copy_tree(v)?),
                None => None,
            };
            let upper = match interval.upper.value {
                Some(v) => Some(ctx.arena.copy_tree(v)?),
                None => None,
            };
            ctx.arena.new_expr(Expr {
                op: ExprOp::RangeSpec(variant),
                arg1: lower,
                arg2: upper,
                arg3: None,
                cast_type: None,
                flags: requel_model::ExprFlags::default(),
            })?
        };
        specs.push(spec);
    }
    Ok(ctx.arena.relink_or(&specs))
}

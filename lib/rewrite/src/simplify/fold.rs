//! Three-valued constant folding over predicates.
//!
//! This is both a simplifier step (drop TRUE conjuncts, collapse a clause
//! whose conjunct is provably non-true) and the provability oracle for the
//! join structuralizer's NULL-substitution check: a WHERE copy "folds
//! false" when some conjunct evaluates to FALSE or NULL for every row.

use crate::{clause_head, set_clause_head, Clause, RewriteContext};
use requel_common::RewriteResult;
use requel_model::{
    BetweenVariant, ExprOp, NodeArena, NodeId, NodeKind, ValueData,
};
use std::cmp::Ordering;

/// Outcome of evaluating a predicate with constant leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tri {
    True,
    False,
    Null,
    /// Not a constant predicate; the fold declines.
    Unknown,
}

fn and3(a: Tri, b: Tri) -> Tri {
    match (a, b) {
        (Tri::False, _) | (_, Tri::False) => Tri::False,
        (Tri::True, other) | (other, Tri::True) => other,
        (Tri::Null, Tri::Null) => Tri::Null,
        _ => Tri::Unknown,
    }
}

fn or3(a: Tri, b: Tri) -> Tri {
    match (a, b) {
        (Tri::True, _) | (_, Tri::True) => Tri::True,
        (Tri::False, other) | (other, Tri::False) => other,
        (Tri::Null, Tri::Null) => Tri::Null,
        _ => Tri::Unknown,
    }
}

fn not3(a: Tri) -> Tri {
    match a {
        Tri::True => Tri::False,
        Tri::False => Tri::True,
        other => other,
    }
}

/// The literal value of a node, looking through unary minus and CAST.
pub(crate) fn const_value(arena: &NodeArena, id: NodeId) -> Option<ValueData> {
    match &arena[id].kind {
        NodeKind::Value(value) => Some(value.data.clone()),
        NodeKind::Expr(expr) => match (expr.op, expr.arg1) {
            (ExprOp::UnaryMinus, Some(arg)) => {
                let inner = const_value(arena, arg)?;
                if inner.is_null() {
                    Some(ValueData::Null)
                } else {
                    inner.negated()
                }
            }
            (ExprOp::Cast, Some(arg)) => const_value(arena, arg),
            _ => None,
        },
        _ => None,
    }
}

fn compare(op: ExprOp, ordering: Ordering) -> Tri {
    let holds = match op {
        ExprOp::Eq => ordering == Ordering::Equal,
        ExprOp::Ne => ordering != Ordering::Equal,
        ExprOp::Lt => ordering == Ordering::Less,
        ExprOp::Le => ordering != Ordering::Greater,
        ExprOp::Gt => ordering == Ordering::Greater,
        ExprOp::Ge => ordering != Ordering::Less,
        _ => return Tri::Unknown,
    };
    if holds {
        Tri::True
    } else {
        Tri::False
    }
}

/// Evaluates one disjunct tree.
pub(crate) fn eval_pred(arena: &NodeArena, id: NodeId) -> Tri {
    let node = &arena[id];
    let expr = match &node.kind {
        NodeKind::Value(value) => {
            return match &value.data {
                ValueData::Bool(true) => Tri::True,
                ValueData::Bool(false) => Tri::False,
                ValueData::Null => Tri::Null,
                _ => Tri::Unknown,
            };
        }
        NodeKind::Expr(expr) => expr,
        _ => return Tri::Unknown,
    };

    match expr.op {
        ExprOp::And => binary3(arena, expr.arg1, expr.arg2, and3),
        ExprOp::Or => binary3(arena, expr.arg1, expr.arg2, or3),
        ExprOp::Not => expr
            .arg1
            .map_or(Tri::Unknown, |a| not3(eval_pred(arena, a))),
        op if op.is_comparison() => {
            let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
                return Tri::Unknown;
            };
            let (Some(va), Some(vb)) = (const_value(arena, a), const_value(arena, b)) else {
                return Tri::Unknown;
            };
            if va.is_null() || vb.is_null() {
                return Tri::Null;
            }
            va.compare(&vb).map_or(Tri::Unknown, |ord| compare(op, ord))
        }
        ExprOp::IsNull | ExprOp::IsNotNull => {
            let Some(a) = expr.arg1 else {
                return Tri::Unknown;
            };
            let Some(va) = const_value(arena, a) else {
                return Tri::Unknown;
            };
            let is_null = va.is_null();
            let holds = if expr.op == ExprOp::IsNull {
                is_null
            } else {
                !is_null
            };
            if holds {
                Tri::True
            } else {
                Tri::False
            }
        }
        ExprOp::Between(variant) => eval_between(arena, expr.arg1, variant, expr.arg2, expr.arg3),
        ExprOp::Range => {
            let Some(attr) = expr.arg1 else {
                return Tri::Unknown;
            };
            let Some(value) = const_value(arena, attr) else {
                return Tri::Unknown;
            };
            if value.is_null() {
                return Tri::Null;
            }
            let mut result = Tri::False;
            for spec in arena.or_list(expr.arg2) {
                let spec_result = match arena[spec].as_expr() {
                    Some(e) => match e.op {
                        ExprOp::RangeSpec(BetweenVariant::EqNa) => {
                            eval_between(arena, expr.arg1, BetweenVariant::GeLe, e.arg1, e.arg1)
                        }
                        ExprOp::RangeSpec(variant) => {
                            eval_between(arena, expr.arg1, variant, e.arg1, e.arg2)
                        }
                        _ => Tri::Unknown,
                    },
                    None => Tri::Unknown,
                };
                result = or3(result, spec_result);
            }
            result
        }
        ExprOp::In => {
            let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
                return Tri::Unknown;
            };
            let Some(va) = const_value(arena, a) else {
                return Tri::Unknown;
            };
            if va.is_null() {
                return Tri::Null;
            }
            let NodeKind::Value(set) = &arena[b].kind else {
                return Tri::Unknown;
            };
            let ValueData::Set(elements) = &set.data else {
                return Tri::Unknown;
            };
            let mut result = Tri::False;
            for &e in elements {
                let member = match const_value(arena, e) {
                    Some(ve) if ve.is_null() => Tri::Null,
                    Some(ve) => va
                        .compare(&ve)
                        .map_or(Tri::Unknown, |ord| compare(ExprOp::Eq, ord)),
                    None => Tri::Unknown,
                };
                result = or3(result, member);
            }
            result
        }
        ExprOp::Like => {
            let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
                return Tri::Unknown;
            };
            match (const_value(arena, a), const_value(arena, b)) {
                (Some(ValueData::Null), _) | (_, Some(ValueData::Null)) => Tri::Null,
                (Some(ValueData::Str(s)), Some(ValueData::Str(p)))
                    if !p.contains(['%', '_']) =>
                {
                    if s == p {
                        Tri::True
                    } else {
                        Tri::False
                    }
                }
                _ => Tri::Unknown,
            }
        }
        _ => Tri::Unknown,
    }
}

fn binary3(
    arena: &NodeArena,
    a: Option<NodeId>,
    b: Option<NodeId>,
    f: impl Fn(Tri, Tri) -> Tri,
) -> Tri {
    match (a, b) {
        (Some(a), Some(b)) => f(eval_pred(arena, a), eval_pred(arena, b)),
        _ => Tri::Unknown,
    }
}

fn eval_between(
    arena: &NodeArena,
    attr: Option<NodeId>,
    variant: BetweenVariant,
    lower: Option<NodeId>,
    upper: Option<NodeId>,
) -> Tri {
    let Some(attr) = attr else {
        return Tri::Unknown;
    };
    let Some(value) = const_value(arena, attr) else {
        return Tri::Unknown;
    };
    if value.is_null() {
        return Tri::Null;
    }
    let variant = if variant == BetweenVariant::And {
        BetweenVariant::GeLe
    } else {
        variant
    };

    let lower_holds = if variant.has_lower() {
        match lower.and_then(|l| const_value(arena, l)) {
            Some(ValueData::Null) => Tri::Null,
            Some(lv) => match value.compare(&lv) {
                Some(Ordering::Greater) => Tri::True,
                Some(Ordering::Equal) if !variant.lower_open() => Tri::True,
                Some(_) => Tri::False,
                None => Tri::Unknown,
            },
            None => Tri::Unknown,
        }
    } else {
        Tri::True
    };
    let upper_holds = if variant.has_upper() {
        match upper.and_then(|u| const_value(arena, u)) {
            Some(ValueData::Null) => Tri::Null,
            Some(uv) => match value.compare(&uv) {
                Some(Ordering::Less) => Tri::True,
                Some(Ordering::Equal) if !variant.upper_open() => Tri::True,
                Some(_) => Tri::False,
                None => Tri::Unknown,
            },
            None => Tri::Unknown,
        }
    } else {
        Tri::True
    };
    and3(lower_holds, upper_holds)
}

/// Evaluates a whole conjunct, i.e. the disjunction over its or chain.
pub(crate) fn eval_disjunction(arena: &NodeArena, conjunct: NodeId) -> Tri {
    let mut result = Tri::False;
    for d in arena.or_list(Some(conjunct)) {
        result = or3(result, eval_pred(arena, d));
    }
    result
}

/// Whether a conjunct list is provably never satisfied (some conjunct is
/// constant FALSE or NULL).
pub(crate) fn where_folds_false(arena: &NodeArena, head: Option<NodeId>) -> bool {
    arena
        .list(head)
        .into_iter()
        .any(|c| matches!(eval_disjunction(arena, c), Tri::False | Tri::Null))
}

/// Replaces the predicates at `location` with literal FALSE: at location 0
/// the whole clause collapses, at an ON location only that location's
/// conjuncts are replaced (keeping outer-join correctness).
pub(crate) fn collapse_false(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
    location: u32,
) -> RewriteResult<()> {
    let false_node = ctx.arena.new_bool(false)?;
    ctx.arena[false_node].location = location;
    if location == 0 {
        set_clause_head(ctx.arena, stmt, clause, Some(false_node));
        return Ok(());
    }
    let kept: Vec<NodeId> = ctx
        .arena
        .list(clause_head(ctx.arena, stmt, clause))
        .into_iter()
        .filter(|&c| ctx.arena[c].location != location)
        .collect();
    let head = ctx.arena.relink(&kept);
    let head = ctx.arena.concat(head, Some(false_node));
    set_clause_head(ctx.arena, stmt, clause, head);
    Ok(())
}

/// One folding sweep over a clause: drops constant-FALSE disjuncts,
/// removes constant-TRUE conjuncts, and collapses locations whose conjunct
/// is provably non-true.
pub(crate) fn fold_constants(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<bool> {
    let mut changed = false;
    let mut collapsed: Vec<u32> = Vec::new();
    let mut kept = Vec::new();

    let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));
    for &original in &ids {
        let conjunct = original;
        let location = ctx.arena[conjunct].location;

        // Drop disjuncts that can never contribute a TRUE.
        let ors = ctx.arena.or_list(Some(conjunct));
        let conjunct = if ors.len() > 1 {
            let live: Vec<NodeId> = ors
                .iter()
                .copied()
                .filter(|&d| !matches!(eval_pred(ctx.arena, d), Tri::False | Tri::Null))
                .collect();
            if live.len() == ors.len() {
                conjunct
            } else {
                changed = true;
                match ctx.arena.relink_or(&live) {
                    Some(new_head) => {
                        ctx.arena[new_head].location = location;
                        new_head
                    }
                    None => {
                        if !collapsed.contains(&location) {
                            collapsed.push(location);
                        }
                        continue;
                    }
                }
            }
        } else {
            conjunct
        };

        match eval_disjunction(ctx.arena, conjunct) {
            Tri::True if location == 0 => changed = true,
            Tri::False | Tri::Null => {
                // A lone literal FALSE at its location is the collapsed
                // form already; collapsing again would never reach a
                // fixed point.
                let already_collapsed = ctx.arena[conjunct].is_bool_literal(false)
                    && ids
                        .iter()
                        .all(|&o| o == original || ctx.arena[o].location != location);
                if already_collapsed {
                    kept.push(conjunct);
                } else {
                    changed = true;
                    if !collapsed.contains(&location) {
                        collapsed.push(location);
                    }
                }
            }
            _ => kept.push(conjunct),
        }
    }

    if collapsed.contains(&0) {
        collapse_false(ctx, stmt, clause, 0)?;
        return Ok(true);
    }
    let head = ctx.arena.relink(&kept);
    set_clause_head(ctx.arena, stmt, clause, head);
    for location in collapsed {
        collapse_false(ctx, stmt, clause, location)?;
    }
    Ok(changed)
}

/// Removes conjuncts structurally equal to an earlier conjunct at the same
/// location (equality propagation can manufacture such duplicates).
pub(crate) fn dedup_conjuncts(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<bool> {
    let ids = ctx.arena.list(clause_head(ctx.arena, stmt, clause));
    let mut kept: Vec<NodeId> = Vec::with_capacity(ids.len());
    for id in ids {
        let duplicate = kept.iter().any(|&k| {
            ctx.arena[k].location == ctx.arena[id].location && ctx.arena.trees_equal(k, id)
        });
        if !duplicate {
            kept.push(id);
        }
    }
    let changed = kept.len() != ctx.arena.list(clause_head(ctx.arena, stmt, clause)).len();
    if changed {
        let head = ctx.arena.relink(&kept);
        set_clause_head(ctx.arena, stmt, clause, head);
    }
    Ok(changed)
}

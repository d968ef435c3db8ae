//! Operand converse: constants move to the right of comparisons, the
//! operand with more attribute references moves to the left, and unary
//! minus commutes off the attribute side.

use crate::simplify::fold::const_value;
use crate::{clause_head, set_clause_head, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::visit::count_names;
use requel_model::{BetweenVariant, ExprOp, NodeArena, NodeId, NodeKind};

pub(crate) fn apply(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;
    let mut out = Vec::new();
    let mut spliced = false;

    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
        if let Some(second) = decompose_negated_between(ctx, conjunct)? {
            changed = true;
            spliced = true;
            out.push(conjunct);
            out.push(second);
            continue;
        }
        for disjunct in ctx.arena.or_list(Some(conjunct)) {
            changed |= converse_term(ctx.arena, disjunct);
        }
        out.push(conjunct);
    }

    if spliced {
        let head = ctx.arena.relink(&out);
        set_clause_head(ctx.arena, stmt, clause, head);
    }
    Ok(Transformed::new((), changed))
}

/// `-a BETWEEN lo AND hi` decomposes to `-a >= lo AND -a <= hi`, each of
/// which the comparison converse then turns into `a <= -lo` / `a >= -hi`.
/// Only a lone disjunct may split into two conjuncts.
fn decompose_negated_between(
    ctx: &mut RewriteContext<'_>,
    conjunct: NodeId,
) -> RewriteResult<Option<NodeId>> {
    if ctx.arena[conjunct].or_next.is_some() {
        return Ok(None);
    }
    let Some(expr) = ctx.arena[conjunct].as_expr() else {
        return Ok(None);
    };
    if expr.op != ExprOp::Between(BetweenVariant::And) {
        return Ok(None);
    }
    let (Some(attr), Some(lower), Some(upper)) = (expr.arg1, expr.arg2, expr.arg3) else {
        return Ok(None);
    };
    if ctx.arena[attr].expr_op() != Some(ExprOp::UnaryMinus) {
        return Ok(None);
    }

    let location = ctx.arena[conjunct].location;
    let attr_copy = ctx.arena.copy_tree(attr)?;
    if let Some(expr) = ctx.arena[conjunct].as_expr_mut() {
        expr.op = ExprOp::Ge;
        expr.arg2 = Some(lower);
        expr.arg3 = None;
    }
    let second = ctx.arena.binary_pred(ExprOp::Le, attr_copy, upper)?;
    ctx.arena[second].location = location;
    Ok(Some(second))
}

fn converse_term(arena: &mut NodeArena, disjunct: NodeId) -> bool {
    let Some(expr) = arena[disjunct].as_expr() else {
        return false;
    };
    if !expr.op.is_comparison() {
        return false;
    }
    let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
        return false;
    };
    let mut changed = false;

    // Constant left of a non-constant: mirror. Two attribute sides: the
    // side referring to more attributes leads, so a lone sargable column
    // tends to dominate the left.
    let swap = if is_const_operand(arena, a) && !is_const_operand(arena, b) {
        true
    } else if !is_const_operand(arena, a) && !is_const_operand(arena, b) {
        count_names(arena, b) > count_names(arena, a)
    } else {
        false
    };
    if swap {
        if let Some(mirrored) = arena[disjunct].expr_op().and_then(ExprOp::mirrored) {
            if let Some(expr) = arena[disjunct].as_expr_mut() {
                expr.op = mirrored;
                expr.arg1 = Some(b);
                expr.arg2 = Some(a);
                changed = true;
            }
        }
    }

    changed | commute_unary_minus(arena, disjunct)
}

/// `-attr OP const` becomes `attr OP' -const`.
fn commute_unary_minus(arena: &mut NodeArena, disjunct: NodeId) -> bool {
    let Some(expr) = arena[disjunct].as_expr() else {
        return false;
    };
    let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
        return false;
    };
    let Some(inner) = arena[a].as_expr().and_then(|e| {
        (e.op == ExprOp::UnaryMinus).then_some(e.arg1).flatten()
    }) else {
        return false;
    };

    // The right side must be a literal we can negate in place, or itself a
    // negation we can strip.
    let new_b = match &arena[b].kind {
        NodeKind::Value(value) => match value.data.negated() {
            Some(negated) => {
                if let NodeKind::Value(value) = &mut arena[b].kind {
                    value.data = negated;
                }
                b
            }
            None => return false,
        },
        NodeKind::Expr(e) if e.op == ExprOp::UnaryMinus => match e.arg1 {
            Some(inner_b) => inner_b,
            None => return false,
        },
        _ => return false,
    };

    let Some(mirrored) = arena[disjunct].expr_op().and_then(ExprOp::mirrored) else {
        return false;
    };
    if let Some(expr) = arena[disjunct].as_expr_mut() {
        expr.op = mirrored;
        expr.arg1 = Some(inner);
        expr.arg2 = Some(new_b);
    }
    true
}

fn is_const_operand(arena: &NodeArena, id: NodeId) -> bool {
    matches!(&arena[id].kind, NodeKind::HostVar(_) | NodeKind::Value(_))
        || const_value(arena, id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_common::EmptySchema;
    use requel_model::AstBuilder;

    fn run(b: AstBuilder, select: NodeId) -> String {
        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        apply(&mut ctx, select, Clause::Where).unwrap();
        arena.sql(select)
    }

    #[test]
    fn constant_moves_right_with_mirrored_operator() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let five = b.int(5);
        let a = b.name(t, "a");
        let pred = b.lt(five, a);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(run(b, select), "SELECT t.a FROM t WHERE t.a > 5");
    }

    #[test]
    fn heavier_attribute_side_moves_left() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let bb = b.name(t, "b");
        let c = b.name(t, "c");
        let sum = b.plus(bb, c);
        let pred = b.ge(a, sum);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t WHERE t.b + t.c <= t.a"
        );
    }

    #[test]
    fn unary_minus_commutes() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let neg = b.unary_minus(a);
        let five = b.int(5);
        let pred = b.gt(neg, five);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(run(b, select), "SELECT t.a FROM t WHERE t.a < -5");
    }

    #[test]
    fn negated_between_decomposes_and_converses() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let neg = b.unary_minus(a);
        let one = b.int(1);
        let nine = b.int(9);
        let pred = b.between(neg, one, nine);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        // First sweep splits, second sweep commutes the minus.
        apply(&mut ctx, select, Clause::Where).unwrap();
        apply(&mut ctx, select, Clause::Where).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t WHERE t.a <= -1 AND t.a >= -9"
        );
    }
}

//! Conversion of predicate trees to conjunctive normal form.
//!
//! Negations are pushed to the leaves first (De Morgan, complement
//! operators, double-negation elimination), then AND is distributed over
//! OR. Node identity is preserved where possible; only distribution that
//! reuses a subtree more than once copies it.

use crate::RewriteContext;
use requel_common::{RewriteResult, Transformed};
use requel_model::{Expr, ExprOp, NodeId};

/// Normalizes a whole conjunct list to CNF chains, preserving each source
/// conjunct's location on everything derived from it.
pub(crate) fn cnf_list(
    ctx: &mut RewriteContext<'_>,
    head: Option<NodeId>,
) -> RewriteResult<Transformed<Option<NodeId>>> {
    let mut out = Vec::new();
    let mut changed = false;
    for conjunct in ctx.arena.list(head) {
        let location = ctx.arena[conjunct].location;

        // The or chain of the conjunct is one disjunction; fold it into
        // the distribution below.
        let disjuncts = ctx.arena.or_list(Some(conjunct));
        for &d in &disjuncts {
            ctx.arena[d].or_next = None;
        }

        let mut result: Option<Vec<Vec<NodeId>>> = None;
        for d in disjuncts {
            let d = normalize_not(ctx, d, &mut changed)?;
            let cnf = cnf_tree(ctx, d, &mut changed)?;
            result = Some(match result {
                None => cnf,
                Some(acc) => distribute(ctx, acc, cnf)?,
            });
        }

        for mut conjunct_ids in result.unwrap_or_default() {
            conjunct_ids.dedup_by(|a, b| ctx.arena.trees_equal(*a, *b));
            for &id in &conjunct_ids {
                ctx.arena[id].location = location;
            }
            if let Some(new_head) = ctx.arena.relink_or(&conjunct_ids) {
                out.push(new_head);
            }
        }
    }
    let head = ctx.arena.relink(&out);
    Ok(Transformed::new(head, changed))
}

/// Splits a normalized tree into conjuncts of disjuncts.
fn cnf_tree(
    ctx: &mut RewriteContext<'_>,
    id: NodeId,
    changed: &mut bool,
) -> RewriteResult<Vec<Vec<NodeId>>> {
    let expr = ctx.arena[id].as_expr();
    let (op, arg1, arg2) = match expr {
        Some(e) => (e.op, e.arg1, e.arg2),
        None => return Ok(vec![vec![id]]),
    };
    match (op, arg1, arg2) {
        (ExprOp::And, Some(a), Some(b)) => {
            *changed = true;
            let mut left = cnf_tree(ctx, a, changed)?;
            left.extend(cnf_tree(ctx, b, changed)?);
            Ok(left)
        }
        (ExprOp::Or, Some(a), Some(b)) => {
            *changed = true;
            let left = cnf_tree(ctx, a, changed)?;
            let right = cnf_tree(ctx, b, changed)?;
            distribute(ctx, left, right)
        }
        _ => Ok(vec![vec![id]]),
    }
}

/// `(∧ᵢ Lᵢ) ∨ (∧ⱼ Rⱼ)  ≡  ∧ᵢⱼ (Lᵢ ∨ Rⱼ)`. Each source conjunct is reused
/// once and copied for every further pairing.
fn distribute(
    ctx: &mut RewriteContext<'_>,
    left: Vec<Vec<NodeId>>,
    right: Vec<Vec<NodeId>>,
) -> RewriteResult<Vec<Vec<NodeId>>> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for (i, l) in left.iter().enumerate() {
        for (j, r) in right.iter().enumerate() {
            let mut ids = copy_conjunct(ctx, l, j > 0)?;
            ids.extend(copy_conjunct(ctx, r, i > 0)?);
            out.push(ids);
        }
    }
    Ok(out)
}

fn copy_conjunct(
    ctx: &mut RewriteContext<'_>,
    ids: &[NodeId],
    copy: bool,
) -> RewriteResult<Vec<NodeId>> {
    if !copy {
        return Ok(ids.to_vec());
    }
    ids.iter()
        .map(|&id| ctx.arena.copy_tree(id).map_err(Into::into))
        .collect()
}

/// Rewrites away every `NOT` that has a pushable operand.
fn normalize_not(
    ctx: &mut RewriteContext<'_>,
    id: NodeId,
    changed: &mut bool,
) -> RewriteResult<NodeId> {
    let expr = ctx.arena[id].as_expr();
    let (op, arg1, arg2) = match expr {
        Some(e) => (e.op, e.arg1, e.arg2),
        None => return Ok(id),
    };
    match (op, arg1) {
        (ExprOp::Not, Some(inner)) => {
            let negated = negate(ctx, inner, changed)?;
            if negated == id {
                return Ok(id);
            }
            *changed = true;
            Ok(negated)
        }
        (ExprOp::And | ExprOp::Or, Some(a)) => {
            let new_a = normalize_not(ctx, a, changed)?;
            let new_b = match arg2 {
                Some(b) => Some(normalize_not(ctx, b, changed)?),
                None => None,
            };
            if let Some(e) = ctx.arena[id].as_expr_mut() {
                e.arg1 = Some(new_a);
                e.arg2 = new_b;
            }
            Ok(id)
        }
        _ => Ok(id),
    }
}

/// Returns a tree equivalent to `NOT id`. Reuses `id` in place where an
/// operator flip suffices; wraps operands with no complement in a fresh
/// `NOT`.
fn negate(
    ctx: &mut RewriteContext<'_>,
    id: NodeId,
    changed: &mut bool,
) -> RewriteResult<NodeId> {
    let expr = ctx.arena[id].as_expr();
    let (op, arg1, arg2) = match expr {
        Some(e) => (e.op, e.arg1, e.arg2),
        None => {
            let not = ctx.arena.new_expr(Expr::unary(ExprOp::Not, id))?;
            return Ok(not);
        }
    };
    match (op, arg1, arg2) {
        (ExprOp::And, Some(a), Some(b)) | (ExprOp::Or, Some(a), Some(b)) => {
            let flipped = if op == ExprOp::And {
                ExprOp::Or
            } else {
                ExprOp::And
            };
            let new_a = negate(ctx, a, changed)?;
            let new_b = negate(ctx, b, changed)?;
            if let Some(e) = ctx.arena[id].as_expr_mut() {
                e.op = flipped;
                e.arg1 = Some(new_a);
                e.arg2 = Some(new_b);
            }
            Ok(id)
        }
        (ExprOp::Not, Some(inner), _) => normalize_not(ctx, inner, changed),
        _ => match op.complement() {
            Some(complement) => {
                if let Some(e) = ctx.arena[id].as_expr_mut() {
                    e.op = complement;
                }
                Ok(id)
            }
            None => {
                let not = ctx.arena.new_expr(Expr::unary(ExprOp::Not, id))?;
                Ok(not)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_common::EmptySchema;
    use requel_model::{AstBuilder, NodeArena};

    fn run(arena: &mut NodeArena, root: NodeId, pred: NodeId) -> String {
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(arena, &EmptySchema, &mut host_vars, root);
        let head = cnf_list(&mut ctx, Some(pred)).unwrap().data.unwrap();
        let ids = ctx.arena.list(Some(head));
        let mut out = Vec::new();
        for id in ids {
            let ors = ctx.arena.or_list(Some(id));
            let texts: Vec<String> = ors.iter().map(|&d| ctx.arena.sql(d)).collect();
            out.push(texts.join(" OR "));
        }
        out.join(" & ")
    }

    #[test]
    fn negation_pushes_to_complement_operators() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let five = b.int(5);
        let eq = b.eq(a, five);
        let bb = b.name(t, "b");
        let two = b.int(2);
        let gt = b.gt(bb, two);
        let or = b.or(eq, gt);
        let not = b.not(or);
        let col = b.name(t, "a");
        let root = b.select().column(col).from(t).predicate(not).build(&mut b);

        let mut arena = b.into_arena();
        assert_eq!(run(&mut arena, root, not), "t.a <> 5 & t.b <= 2");
    }

    #[test]
    fn distribution_produces_cnf() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let one = b.int(1);
        let p1 = b.eq(a, one);
        let bb = b.name(t, "b");
        let two = b.int(2);
        let p2 = b.eq(bb, two);
        let c = b.name(t, "c");
        let three = b.int(3);
        let p3 = b.eq(c, three);
        let and = b.and(p1, p2);
        let or = b.or(and, p3);
        let col = b.name(t, "a");
        let root = b.select().column(col).from(t).predicate(or).build(&mut b);

        let mut arena = b.into_arena();
        assert_eq!(
            run(&mut arena, root, or),
            "t.a = 1 OR t.c = 3 & t.b = 2 OR t.c = 3"
        );
    }

    #[test]
    fn double_negation_cancels() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let five = b.int(5);
        let eq = b.eq(a, five);
        let not1 = b.not(eq);
        let not2 = b.not(not1);
        let col = b.name(t, "a");
        let root = b.select().column(col).from(t).predicate(not2).build(&mut b);

        let mut arena = b.into_arena();
        assert_eq!(run(&mut arena, root, not2), "t.a = 5");
    }

    #[test]
    fn already_normal_input_is_unchanged() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let five = b.int(5);
        let p1 = b.eq(a, five);
        let bb = b.name(t, "b");
        let two = b.int(2);
        let p2 = b.gt(bb, two);
        b.arena[p1].or_next = Some(p2);
        let col = b.name(t, "a");
        let root = b.select().column(col).from(t).predicate(p1).build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, root);
        let result = cnf_list(&mut ctx, Some(p1)).unwrap();
        assert!(!result.transformed);
        assert_eq!(result.data, Some(p1));
    }
}

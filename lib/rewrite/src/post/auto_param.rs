//! Auto-parameterization of literal constants.
//!
//! Replacing literals with host-variable placeholders lets structurally
//! equal queries share one cached plan. Placeholder indices count up in
//! visit order and the displaced values append to the caller's
//! host-variable vector. Partition-key columns keep their literals (the
//! pruner needs them at compile time), as do FULL_RANGE terms.

use crate::{clause_head, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::{ExprOp, HostVar, Node, NodeId, NodeKind, ValueData};

pub(crate) fn auto_parameterize(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;
    for clause in [Clause::Where, Clause::Having, Clause::OrderByFor] {
        for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
            for disjunct in ctx.arena.or_list(Some(conjunct)) {
                changed |= parameterize_disjunct(ctx, disjunct)?;
            }
        }
    }
    Ok(Transformed::new((), changed))
}

fn parameterize_disjunct(ctx: &mut RewriteContext<'_>, disjunct: NodeId) -> RewriteResult<bool> {
    let Some(expr) = ctx.arena[disjunct].as_expr() else {
        return Ok(false);
    };
    if expr.flags.full_range {
        return Ok(false);
    }
    let (op, arg1, arg2, arg3) = (expr.op, expr.arg1, expr.arg2, expr.arg3);

    let parameterizable = matches!(
        op,
        ExprOp::Eq
            | ExprOp::Lt
            | ExprOp::Le
            | ExprOp::Gt
            | ExprOp::Ge
            | ExprOp::Like
            | ExprOp::Between(_)
            | ExprOp::Range
    );
    if !parameterizable {
        return Ok(false);
    }
    if arg1.is_some_and(|a| is_partition_key(ctx, a)) {
        return Ok(false);
    }

    let mut changed = false;
    match op {
        ExprOp::Between(_) => {
            let new2 = parameterize_slot(ctx, arg2)?;
            let new3 = parameterize_slot(ctx, arg3)?;
            changed = new2.is_some() || new3.is_some();
            if let Some(expr) = ctx.arena[disjunct].as_expr_mut() {
                if let Some(id) = new2 {
                    expr.arg2 = Some(id);
                }
                if let Some(id) = new3 {
                    expr.arg3 = Some(id);
                }
            }
        }
        ExprOp::Range => {
            for spec in ctx.arena.or_list(arg2) {
                let Some(spec_expr) = ctx.arena[spec].as_expr() else {
                    continue;
                };
                let (s1, s2) = (spec_expr.arg1, spec_expr.arg2);
                let new1 = parameterize_slot(ctx, s1)?;
                let new2 = parameterize_slot(ctx, s2)?;
                changed |= new1.is_some() || new2.is_some();
                if let Some(spec_expr) = ctx.arena[spec].as_expr_mut() {
                    if let Some(id) = new1 {
                        spec_expr.arg1 = Some(id);
                    }
                    if let Some(id) = new2 {
                        spec_expr.arg2 = Some(id);
                    }
                }
            }
        }
        _ => {
            let new2 = parameterize_slot(ctx, arg2)?;
            changed = new2.is_some();
            if let Some(expr) = ctx.arena[disjunct].as_expr_mut() {
                if let Some(id) = new2 {
                    expr.arg2 = Some(id);
                }
            }
        }
    }
    Ok(changed)
}

/// A fresh host-variable node for a literal slot; NULLs and set literals
/// keep their spot.
fn parameterize_slot(
    ctx: &mut RewriteContext<'_>,
    slot: Option<NodeId>,
) -> RewriteResult<Option<NodeId>> {
    let Some(id) = slot else {
        return Ok(None);
    };
    let NodeKind::Value(value) = &ctx.arena[id].kind else {
        return Ok(None);
    };
    if matches!(value.data, ValueData::Null | ValueData::Set(_)) {
        return Ok(None);
    }
    let data = value.data.clone();
    let index = ctx.add_host_var(data);
    let mut node = Node::typed(
        NodeKind::HostVar(HostVar { index }),
        ctx.arena[id].type_enum,
    );
    node.data_type = ctx.arena[id].data_type;
    Ok(Some(ctx.arena.try_alloc(node)?))
}

fn is_partition_key(ctx: &RewriteContext<'_>, id: NodeId) -> bool {
    let NodeKind::Name(name) = &ctx.arena[id].kind else {
        return false;
    };
    ctx.schema
        .class_of(name.spec_id)
        .is_some_and(|class| ctx.schema.is_partition_key(&class, &name.original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RewritePass;
    use requel_common::{Domain, EmptySchema, MemorySchema};
    use requel_model::{AstBuilder, SqlType};

    #[test]
    fn literals_become_numbered_host_variables() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let five = b.int(5);
        let p1 = b.eq(a, five);
        let c = b.name(t, "c");
        let lo = b.int(1);
        let hi = b.int(9);
        let p2 = b.between(c, lo, hi);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .predicate(p1)
            .predicate(p2)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        auto_parameterize(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t WHERE t.a = ?:0 AND t.c BETWEEN ?:1 AND ?:2"
        );
        assert_eq!(
            host_vars,
            vec![ValueData::Int(5), ValueData::Int(1), ValueData::Int(9)]
        );
    }

    #[test]
    fn partition_key_literals_stay() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let five = b.int(5);
        let pred = b.eq(a, five);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);

        let mut schema = MemorySchema::new();
        schema.add_class(
            "t",
            &[(
                "a",
                Domain {
                    type_enum: SqlType::Integer,
                    data_type: None,
                    nullable: true,
                },
            )],
        );
        schema.mark_partition_key("t", "a");
        schema.bind_spec(b.spec_id(t), "t");

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &schema, &mut host_vars, select);
        auto_parameterize(&mut ctx, select).unwrap();
        assert_eq!(arena.sql(select), "SELECT t.a FROM t WHERE t.a = 5");
        assert!(host_vars.is_empty());
    }

    #[test]
    fn range_bounds_parameterize() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a1 = b.name(t, "a");
        let ten = b.int(10);
        let twenty = b.int(20);
        let p1 = b.between(a1, ten, twenty);
        let a2 = b.name(t, "a");
        let fifteen = b.int(15);
        let p2 = b.gt(a2, fifteen);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .predicate(p1)
            .predicate(p2)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        crate::simplify::AlgebraicSimplifier
            .rewrite(&mut ctx, select)
            .unwrap();
        auto_parameterize(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t WHERE t.a RANGE(?:0 GT_LE ?:1)"
        );
        assert_eq!(host_vars, vec![ValueData::Int(15), ValueData::Int(20)]);
    }
}

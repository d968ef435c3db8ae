//! Predicate normalization: CNF form for WHERE and HAVING, and the
//! aggregate-aware HAVING split.

mod cnf;

use crate::{clause_head, select_parts, set_clause_head, Clause, RewriteContext, RewritePass};
use requel_common::{RewriteResult, Transformed};
use requel_model::visit::{contains_aggregate, contains_row_numbering};
use requel_model::NodeId;

/// Converts WHERE and HAVING to conjunctive normal form and moves HAVING
/// conjuncts without aggregates down to WHERE.
///
/// A conjunct with an OR chain moves (or stays) as one unit; predicates
/// over row-numbering functions are pinned to their clause.
#[derive(Debug, Default)]
pub struct PredicateNormalizer;

impl RewritePass for PredicateNormalizer {
    fn name(&self) -> &str {
        "predicate-normalizer"
    }

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>> {
        let mut changed = false;
        for clause in [Clause::Where, Clause::Having] {
            let head = clause_head(ctx.arena, stmt, clause);
            let result = cnf::cnf_list(ctx, head)?;
            set_clause_head(ctx.arena, stmt, clause, result.data);
            changed |= result.transformed;
        }
        changed |= split_having(ctx, stmt)?;
        Ok(Transformed::new((), changed))
    }
}

/// Moves HAVING conjuncts that reference no aggregate (ignoring aggregates
/// nested in subqueries) into WHERE.
fn split_having(ctx: &mut RewriteContext<'_>, stmt: NodeId) -> RewriteResult<bool> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(false);
    };
    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for conjunct in ctx.arena.list(select.having) {
        let pinned = contains_aggregate(ctx.arena, conjunct)
            || contains_row_numbering(ctx.arena, conjunct);
        if pinned {
            kept.push(conjunct);
        } else {
            moved.push(conjunct);
        }
    }
    if moved.is_empty() {
        return Ok(false);
    }
    let having = ctx.arena.relink(&kept);
    let moved_head = ctx.arena.relink(&moved);
    let where_clause = ctx.arena.concat(select.where_clause, moved_head);
    set_clause_head(ctx.arena, stmt, Clause::Having, having);
    set_clause_head(ctx.arena, stmt, Clause::Where, where_clause);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_common::EmptySchema;
    use requel_model::{AstBuilder, FunctionKind};

    #[test]
    fn having_split_moves_plain_conjuncts_to_where() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let sum_arg = b.name(t, "b");
        let sum = b.func(FunctionKind::Sum, vec![sum_arg]);
        let five = b.int(5);
        let agg_pred = b.gt(sum, five);
        let c = b.name(t, "c");
        let two = b.int(2);
        let plain_pred = b.eq(c, two);
        let group_col = b.name(t, "a");
        let select = b
            .select()
            .column(a)
            .from(t)
            .group_by(group_col)
            .having(agg_pred)
            .having(plain_pred)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        let result = PredicateNormalizer.rewrite(&mut ctx, select).unwrap();
        assert!(result.transformed);
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t WHERE t.c = 2 GROUP BY t.a HAVING SUM(t.b) > 5"
        );
    }

    #[test]
    fn or_chained_conjunct_moves_as_one_unit() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let c1 = b.name(t, "c");
        let one = b.int(1);
        let p1 = b.eq(c1, one);
        let c2 = b.name(t, "d");
        let two = b.int(2);
        let p2 = b.eq(c2, two);
        b.arena[p1].or_next = Some(p2);
        let group_col = b.name(t, "a");
        let select = b
            .select()
            .column(a)
            .from(t)
            .group_by(group_col)
            .having(p1)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        PredicateNormalizer.rewrite(&mut ctx, select).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t WHERE (t.c = 1 OR t.d = 2) GROUP BY t.a"
        );
    }
}

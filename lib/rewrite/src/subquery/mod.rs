//! Subquery-to-derived-table rewrites.
//!
//! Uncorrelated subqueries in equality, IN and quantified-SOME positions
//! become derived-table joins; set constructors compared against OID
//! attributes become `TABLE({...})` derived tables. Every rule requires an
//! uncorrelated, single-column subquery and a top-level, lone conjunct;
//! anything else declines silently.

use crate::{select_parts, RewriteContext, RewritePass};
use requel_common::{RewriteResult, Transformed};
use requel_model::visit::contains_aggregate;
use requel_model::{
    DataTypeDescriptor, DerivedTableType, ExprOp, FunctionCall, FunctionKind, JoinType, Name,
    NameMetaClass, Node, NodeArena, NodeId, NodeKind, Select, Spec, SpecMetaClass, SpecSource,
    SqlType, ValueData,
};

#[derive(Debug, Default)]
pub struct SubqueryRewriter;

impl RewritePass for SubqueryRewriter {
    fn name(&self) -> &str {
        "subquery-rewriter"
    }

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>> {
        if select_parts(ctx.arena, stmt).is_none() {
            return Ok(Transformed::no(()));
        }
        let mut changed = false;
        for conjunct in ctx
            .arena
            .list(select_parts(ctx.arena, stmt).and_then(|s| s.where_clause))
        {
            if ctx.arena[conjunct].or_next.is_some() || ctx.arena[conjunct].location != 0 {
                continue;
            }
            changed |= rewrite_conjunct(ctx, stmt, conjunct)?;
        }
        Ok(Transformed::new((), changed))
    }
}

/// What the rules need to know about a candidate subquery.
struct QueryInfo {
    column_type: SqlType,
    column_data_type: Option<DataTypeDescriptor>,
    uncorrelated: bool,
    /// Set operations and already-aggregated selects need a wrapping
    /// derived table before their select list may be replaced.
    needs_wrap: bool,
}

fn query_info(arena: &NodeArena, query: NodeId) -> Option<QueryInfo> {
    match &arena[query].kind {
        NodeKind::Select(select) => {
            let items = arena.list(select.list);
            let [item] = items.as_slice() else {
                return None;
            };
            let needs_wrap = select.distinct
                || select.group_by.is_some()
                || contains_aggregate(arena, *item);
            Some(QueryInfo {
                column_type: arena[*item].type_enum,
                column_data_type: arena[*item].data_type,
                uncorrelated: select.correlation_level == 0,
                needs_wrap,
            })
        }
        NodeKind::SetOp(set_op) => {
            let left = query_info(arena, set_op.left)?;
            let right = query_info(arena, set_op.right)?;
            Some(QueryInfo {
                column_type: left.column_type,
                column_data_type: left.column_data_type,
                uncorrelated: left.uncorrelated && right.uncorrelated,
                needs_wrap: true,
            })
        }
        _ => None,
    }
}

fn rewrite_conjunct(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    conjunct: NodeId,
) -> RewriteResult<bool> {
    let Some(expr) = ctx.arena[conjunct].as_expr() else {
        return Ok(false);
    };
    let (op, arg1, arg2) = (expr.op, expr.arg1, expr.arg2);
    let (Some(a), Some(b)) = (arg1, arg2) else {
        return Ok(false);
    };

    match op {
        ExprOp::Eq => {
            if let Some((attr, set)) = oid_set_pair(ctx.arena, a, b) {
                return hoist_oid_set(ctx, stmt, conjunct, attr, set);
            }
            // `expr = subquery`, either side.
            let (value_side, query) = if ctx.arena[b].is_query() {
                (a, b)
            } else if ctx.arena[a].is_query() {
                (b, a)
            } else {
                return Ok(false);
            };
            let Some(info) = query_info(ctx.arena, query) else {
                return Ok(false);
            };
            if !info.uncorrelated {
                return Ok(false);
            }
            let name = hoist_derived(ctx, stmt, query, &info)?;
            set_comparison(ctx.arena, conjunct, ExprOp::Eq, value_side, name);
            Ok(true)
        }
        ExprOp::In => {
            if !ctx.arena[b].is_query() {
                return Ok(false);
            }
            let Some(info) = query_info(ctx.arena, b) else {
                return Ok(false);
            };
            if !info.uncorrelated {
                return Ok(false);
            }
            let name = hoist_derived(ctx, stmt, b, &info)?;
            set_comparison(ctx.arena, conjunct, ExprOp::Eq, a, name);
            Ok(true)
        }
        op if op.is_quantified_some() => {
            if !ctx.arena[b].is_query() {
                return Ok(false);
            }
            let Some(info) = query_info(ctx.arena, b) else {
                return Ok(false);
            };
            if !info.uncorrelated {
                return Ok(false);
            }
            let Some(base) = op.some_base() else {
                return Ok(false);
            };
            // `attr > SOME s` holds iff `attr > MIN(s)`; mirrored for `<`.
            // This matches the original engine even for possibly-empty
            // subqueries, where the two disagree.
            let agg = match base {
                ExprOp::Gt | ExprOp::Ge => FunctionKind::Min,
                _ => FunctionKind::Max,
            };
            let query = if info.needs_wrap {
                wrap_in_derived(ctx, b, agg, &info)?
            } else {
                aggregate_select_list(ctx, b, agg)?;
                b
            };
            let name = hoist_derived(ctx, stmt, query, &info)?;
            set_comparison(ctx.arena, conjunct, base, a, name);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// `oid_attr = {…}` in either orientation.
fn oid_set_pair(arena: &NodeArena, a: NodeId, b: NodeId) -> Option<(NodeId, NodeId)> {
    let is_oid = |id: NodeId| {
        matches!(
            &arena[id].kind,
            NodeKind::Name(name) if name.meta_class == NameMetaClass::OidAttr
        )
    };
    let is_set = |id: NodeId| {
        matches!(
            &arena[id].kind,
            NodeKind::Value(value) if matches!(value.data, ValueData::Set(_))
        )
    };
    if is_oid(a) && is_set(b) {
        Some((a, b))
    } else if is_oid(b) && is_set(a) {
        Some((b, a))
    } else {
        None
    }
}

/// Appends a fresh derived-table spec over `query` to the FROM list and
/// returns a Name node addressing its single column.
fn hoist_derived(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    query: NodeId,
    info: &QueryInfo,
) -> RewriteResult<NodeId> {
    let alias = ctx.fresh_alias();
    let column = ctx.fresh_column();
    let spec_id = ctx.fresh_spec_id();
    append_spec(
        ctx,
        stmt,
        Spec {
            id: spec_id,
            source: SpecSource::Derived(query),
            range_var: alias.clone(),
            as_attr_list: vec![column.clone()],
            join_type: JoinType::None,
            on_cond: None,
            path_entities: Vec::new(),
            path_conjuncts: None,
            meta_class: SpecMetaClass::Regular,
            derived_table_type: Some(DerivedTableType::Subquery),
        },
    )?;
    let mut name = Node::typed(
        NodeKind::Name(Name {
            original: column,
            resolved: alias,
            spec_id,
            meta_class: NameMetaClass::Normal,
        }),
        info.column_type,
    );
    name.data_type = info.column_data_type;
    ctx.arena.try_alloc(name).map_err(Into::into)
}

fn append_spec(ctx: &mut RewriteContext<'_>, stmt: NodeId, spec: Spec) -> RewriteResult<NodeId> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        unreachable!("only SELECT statements reach the subquery rules");
    };
    let location = u32::try_from(ctx.arena.list(select.from).len()).unwrap_or(u32::MAX) + 1;
    let mut node = Node::new(NodeKind::Spec(Box::new(spec)));
    node.location = location;
    let spec_node = ctx.arena.try_alloc(node)?;
    let from = ctx.arena.concat(select.from, Some(spec_node));
    if let Some(select) = ctx.arena[stmt].as_select_mut() {
        select.from = from;
    }
    Ok(spec_node)
}

/// Replaces the single select-list item of a plain subquery with
/// `MIN(item)` / `MAX(item)`.
fn aggregate_select_list(
    ctx: &mut RewriteContext<'_>,
    query: NodeId,
    agg: FunctionKind,
) -> RewriteResult<()> {
    let Some(select) = ctx.arena[query].as_select() else {
        return Ok(());
    };
    let items = ctx.arena.list(select.list);
    let [item] = items.as_slice() else {
        return Ok(());
    };
    let item = *item;
    let column_type = ctx.arena[item].type_enum;
    let func = ctx.arena.try_alloc(Node::typed(
        NodeKind::Function(Box::new(FunctionCall {
            kind: agg,
            args: Some(item),
        })),
        column_type,
    ))?;
    if let Some(select) = ctx.arena[query].as_select_mut() {
        select.list = Some(func);
    }
    Ok(())
}

/// Wraps a set operation or an already-aggregated subquery in an extra
/// derived table so the aggregate has a stable column to range over.
fn wrap_in_derived(
    ctx: &mut RewriteContext<'_>,
    query: NodeId,
    agg: FunctionKind,
    info: &QueryInfo,
) -> RewriteResult<NodeId> {
    let alias = ctx.fresh_alias();
    let column = ctx.fresh_column();
    let spec_id = ctx.fresh_spec_id();
    let mut spec_node = Node::new(NodeKind::Spec(Box::new(Spec {
        id: spec_id,
        source: SpecSource::Derived(query),
        range_var: alias.clone(),
        as_attr_list: vec![column.clone()],
        join_type: JoinType::None,
        on_cond: None,
        path_entities: Vec::new(),
        path_conjuncts: None,
        meta_class: SpecMetaClass::Regular,
        derived_table_type: Some(DerivedTableType::Subquery),
    })));
    spec_node.location = 1;
    let spec_node = ctx.arena.try_alloc(spec_node)?;

    let mut inner_name = Node::typed(
        NodeKind::Name(Name {
            original: column,
            resolved: alias,
            spec_id,
            meta_class: NameMetaClass::Normal,
        }),
        info.column_type,
    );
    inner_name.data_type = info.column_data_type;
    let inner_name = ctx.arena.try_alloc(inner_name)?;
    let func = ctx.arena.try_alloc(Node::typed(
        NodeKind::Function(Box::new(FunctionCall {
            kind: agg,
            args: Some(inner_name),
        })),
        info.column_type,
    ))?;
    let wrapper = Select {
        list: Some(func),
        from: Some(spec_node),
        ..Select::default()
    };
    ctx.arena
        .try_alloc(Node::new(NodeKind::Select(Box::new(wrapper))))
        .map_err(Into::into)
}

fn set_comparison(arena: &mut NodeArena, conjunct: NodeId, op: ExprOp, lhs: NodeId, rhs: NodeId) {
    if let Some(expr) = arena[conjunct].as_expr_mut() {
        expr.op = op;
        expr.arg1 = Some(lhs);
        expr.arg2 = Some(rhs);
        expr.arg3 = None;
    }
}

/// Hoists a set constructor compared against an OID attribute into a
/// `TABLE({...})` derived table joined by equality.
fn hoist_oid_set(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    conjunct: NodeId,
    attr: NodeId,
    set: NodeId,
) -> RewriteResult<bool> {
    let alias = ctx.fresh_alias();
    let column = ctx.fresh_column();
    let spec_id = ctx.fresh_spec_id();
    let element_type = ctx.arena[set]
        .data_type
        .and_then(|dt| dt.element_type)
        .unwrap_or(SqlType::Object);
    append_spec(
        ctx,
        stmt,
        Spec {
            id: spec_id,
            source: SpecSource::SetExpr(set),
            range_var: alias.clone(),
            as_attr_list: vec![column.clone()],
            join_type: JoinType::None,
            on_cond: None,
            path_entities: Vec::new(),
            path_conjuncts: None,
            meta_class: SpecMetaClass::Regular,
            derived_table_type: Some(DerivedTableType::Table),
        },
    )?;
    let name = ctx.arena.try_alloc(Node::typed(
        NodeKind::Name(Name {
            original: column,
            resolved: alias,
            spec_id,
            meta_class: NameMetaClass::Normal,
        }),
        element_type,
    ))?;
    set_comparison(ctx.arena, conjunct, ExprOp::Eq, attr, name);
    Ok(true)
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
        SubqueryRewriter.rewrite(&mut ctx, select).unwrap();
        arena.sql(select)
    }

    #[test]
    fn equality_subquery_becomes_a_derived_table_join() {
        let mut b = AstBuilder::new();
        let u = b.class_spec("u", "u");
        let x = b.name(u, "x");
        let max = b.func(FunctionKind::Max, vec![x]);
        let sub = b.select().column(max).from(u).build(&mut b);
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let pred = b.eq(a, sub);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, (SELECT MAX(u.x) FROM u) dt1 (c2) WHERE t.a = dt1.c2"
        );
    }

    #[test]
    fn in_subquery_joins_on_the_single_column() {
        let mut b = AstBuilder::new();
        let u = b.class_spec("u", "u");
        let x = b.name(u, "x");
        let sub = b.select().column(x).from(u).build(&mut b);
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let pred = b.in_query(a, sub);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, (SELECT u.x FROM u) dt1 (c2) WHERE t.a = dt1.c2"
        );
    }

    #[test]
    fn gt_some_rewrites_to_min_over_a_derived_table() {
        let mut b = AstBuilder::new();
        let u = b.class_spec("u", "u");
        let x = b.name(u, "x");
        let sub = b.select().column(x).from(u).build(&mut b);
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let pred = b.some_cmp(ExprOp::Gt, a, sub);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, (SELECT MIN(u.x) FROM u) dt1 (c2) WHERE t.a > dt1.c2"
        );
    }

    #[test]
    fn aggregated_some_subquery_is_wrapped_first() {
        let mut b = AstBuilder::new();
        let u = b.class_spec("u", "u");
        let x = b.name(u, "x");
        let max = b.func(FunctionKind::Max, vec![x]);
        let sub = b.select().column(max).from(u).build(&mut b);
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let pred = b.some_cmp(ExprOp::Lt, a, sub);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, (SELECT MAX(dt1.c2) FROM (SELECT MAX(u.x) FROM u) dt1 (c2)) dt3 (c4) \
             WHERE t.a < dt3.c4"
        );
    }

    #[test]
    fn correlated_subqueries_decline() {
        let mut b = AstBuilder::new();
        let u = b.class_spec("u", "u");
        let x = b.name(u, "x");
        let sub = b.select().column(x).from(u).correlated(1).build(&mut b);
        let t = b.class_spec("t", "t");
        let a = b.name(t, "a");
        let pred = b.eq(a, sub);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t WHERE t.a = (SELECT u.x FROM u)"
        );
    }

    #[test]
    fn oid_set_constructor_hoists_into_table() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let oid = b.oid_name(t);
        let e1 = b.int(1);
        let e2 = b.int(2);
        let set = b.set_of(vec![e1, e2]);
        let pred = b.eq(oid, set);
        let col = b.name(t, "a");
        let select = b.select().column(col).from(t).predicate(pred).build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, TABLE({1, 2}) dt1 (c2) WHERE t.oid = dt1.c2"
        );
    }
}

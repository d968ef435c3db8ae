//! Equality-term propagation: constants known from `attr = const` conjuncts
//! (or single-point RANGEs) are folded into every other conjunct at the
//! same location, and into the select list. Join predicates are preserved
//! as edges; the substituted form is appended as a TRANSITIVE copy instead
//! of replacing them.

use crate::{clause_head, select_parts, set_clause_head, Clause, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::visit::{
    any_node, substitute_in_list, substitute_in_tree, WalkScope,
};
use requel_model::{
    BetweenVariant, DataTypeDescriptor, Expr, ExprOp, NameMetaClass, NodeArena, NodeId, NodeKind,
    SpecId, SpecSource, SqlType, ValueData,
};
use rustc_hash::FxHashSet;

struct EqCandidate {
    /// Source conjunct, skipped during substitution. For derived-column
    /// bindings this is the spec node, which never appears in a clause.
    source: NodeId,
    spec: SpecId,
    attr: String,
    attr_type: SqlType,
    attr_data_type: Option<DataTypeDescriptor>,
    value: NodeId,
    /// `None` propagates at every location (constant derived columns).
    location: Option<u32>,
}

pub(crate) fn apply(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> RewriteResult<Transformed<()>> {
    let mut changed = false;
    let candidates = collect_candidates(ctx, stmt, clause);
    for candidate in candidates {
        let Some(replacement) = build_replacement(ctx, &candidate)? else {
            continue;
        };
        changed |= propagate_one(ctx, stmt, clause, &candidate, replacement)?;
    }
    Ok(Transformed::new((), changed))
}

fn collect_candidates(
    ctx: &RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
) -> Vec<EqCandidate> {
    let mut out = Vec::new();
    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
        if ctx.arena[conjunct].or_next.is_some() {
            continue;
        }
        if let Some((name, value)) = eq_name_value(ctx.arena, conjunct) {
            out.push(make_candidate(ctx.arena, conjunct, name, value));
        }
    }
    if clause == Clause::Where {
        collect_derived_constants(ctx, stmt, &mut out);
    }
    out
}

/// `attr = const`, either orientation, or a RANGE with a single `EQ_NA`.
fn eq_name_value(arena: &NodeArena, conjunct: NodeId) -> Option<(NodeId, NodeId)> {
    let expr = arena[conjunct].as_expr()?;
    match expr.op {
        ExprOp::Eq => {
            let (a, b) = (expr.arg1?, expr.arg2?);
            if is_plain_name(arena, a) && is_const_scalar(arena, b) {
                Some((a, b))
            } else if is_plain_name(arena, b) && is_const_scalar(arena, a) {
                Some((b, a))
            } else {
                None
            }
        }
        ExprOp::Range => {
            let attr = expr.arg1?;
            if !is_plain_name(arena, attr) {
                return None;
            }
            let chain = arena.or_list(expr.arg2);
            let [only] = chain.as_slice() else {
                return None;
            };
            let spec = arena[*only].as_expr()?;
            if spec.op != ExprOp::RangeSpec(BetweenVariant::EqNa) {
                return None;
            }
            let value = spec.arg1?;
            is_const_scalar(arena, value).then_some((attr, value))
        }
        _ => None,
    }
}

fn is_plain_name(arena: &NodeArena, id: NodeId) -> bool {
    matches!(
        &arena[id].kind,
        NodeKind::Name(name) if name.meta_class == NameMetaClass::Normal
    )
}

fn is_const_scalar(arena: &NodeArena, id: NodeId) -> bool {
    matches!(
        &arena[id].kind,
        NodeKind::Value(v)
            if !matches!(v.data, ValueData::Null | ValueData::Set(_))
    )
}

fn make_candidate(
    arena: &NodeArena,
    conjunct: NodeId,
    name: NodeId,
    value: NodeId,
) -> EqCandidate {
    let node = &arena[name];
    let (spec, attr) = match &node.kind {
        NodeKind::Name(n) => (n.spec_id, n.original.clone()),
        _ => unreachable!("checked by is_plain_name"),
    };
    EqCandidate {
        source: conjunct,
        spec,
        attr,
        attr_type: node.type_enum,
        attr_data_type: node.data_type,
        value,
        location: Some(arena[conjunct].location),
    }
}

/// A derived-table alias bound to a constant select-list column propagates
/// the underlying constant at every location: the binding comes from the
/// spec, not from a located predicate.
fn collect_derived_constants(ctx: &RewriteContext<'_>, stmt: NodeId, out: &mut Vec<EqCandidate>) {
    let Some(select) = ctx.arena[stmt].as_select() else {
        return;
    };
    for spec_node in ctx.arena.list(select.from) {
        let Some(spec) = ctx.arena[spec_node].as_spec() else {
            continue;
        };
        let SpecSource::Derived(query) = &spec.source else {
            continue;
        };
        let query = *query;
        let Some(inner) = ctx.arena[query].as_select() else {
            continue;
        };
        for (i, item) in ctx.arena.list(inner.list).into_iter().enumerate() {
            let Some(column) = spec.as_attr_list.get(i) else {
                break;
            };
            if is_const_scalar(ctx.arena, item) {
                out.push(EqCandidate {
                    source: spec_node,
                    spec: spec.id,
                    attr: column.clone(),
                    attr_type: ctx.arena[item].type_enum,
                    attr_data_type: ctx.arena[item].data_type,
                    value: item,
                    location: None,
                });
            }
        }
    }
}

/// The node substituted for the attribute: a copy of the constant, wrapped
/// in CAST to the attribute's parameterized type when precision or scale
/// differ. Missing type information declines the candidate.
fn build_replacement(
    ctx: &mut RewriteContext<'_>,
    candidate: &EqCandidate,
) -> RewriteResult<Option<NodeId>> {
    let value_node = &ctx.arena[candidate.value];
    if !candidate.attr_type.is_parameterized() {
        return Ok(Some(candidate.value));
    }
    let Some(attr_dt) = candidate.attr_data_type else {
        return Ok(None);
    };
    let same = value_node.type_enum == candidate.attr_type
        && value_node
            .data_type
            .is_some_and(|dt| dt.same_parameters(attr_dt));
    if same {
        return Ok(Some(candidate.value));
    }
    let inner = ctx.arena.copy_tree(candidate.value)?;
    let cast = ctx.arena.try_alloc(requel_model::Node {
        kind: NodeKind::Expr(Expr {
            op: ExprOp::Cast,
            arg1: Some(inner),
            arg2: None,
            arg3: None,
            cast_type: Some(attr_dt),
            flags: requel_model::ExprFlags::default(),
        }),
        next: None,
        or_next: None,
        location: 0,
        type_enum: candidate.attr_type,
        data_type: Some(attr_dt),
    })?;
    Ok(Some(cast))
}

fn propagate_one(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    clause: Clause,
    candidate: &EqCandidate,
    replacement: NodeId,
) -> RewriteResult<bool> {
    let mut changed = false;
    let attr = candidate.attr.as_str();

    for conjunct in ctx.arena.list(clause_head(ctx.arena, stmt, clause)) {
        if conjunct == candidate.source {
            continue;
        }
        if candidate
            .location
            .is_some_and(|l| ctx.arena[conjunct].location != l)
        {
            continue;
        }
        if !mentions_attr(ctx.arena, conjunct, candidate.spec, attr) {
            continue;
        }
        // Derived-column bindings replace the alias outright; only
        // predicate-derived constants must keep join edges intact.
        let keep_join_edges = candidate.location.is_some();
        if keep_join_edges && distinct_spec_count(ctx.arena, conjunct) >= 2 {
            // A join edge stays available to the planner; only a marked
            // copy carries the substitution.
            let copy = ctx.arena.copy_tree(conjunct)?;
            let substituted =
                substitute_in_tree(ctx.arena, copy, candidate.spec, Some(attr), replacement)?;
            if !substituted {
                continue;
            }
            ctx.arena[copy].location = ctx.arena[conjunct].location;
            if let Some(expr) = ctx.arena[copy].as_expr_mut() {
                expr.flags.transitive = true;
            }
            if !is_duplicate(ctx.arena, stmt, clause, copy) {
                let head = clause_head(ctx.arena, stmt, clause);
                let head = ctx.arena.concat(head, Some(copy));
                set_clause_head(ctx.arena, stmt, clause, head);
                changed = true;
            }
        } else {
            changed |=
                substitute_in_tree(ctx.arena, conjunct, candidate.spec, Some(attr), replacement)?;
        }
    }

    // Select-list use-by-name, for top-level bindings only.
    if clause == Clause::Where && candidate.location.map_or(true, |l| l == 0) {
        if let Some(select) = select_parts(ctx.arena, stmt) {
            let (new_list, list_changed) = substitute_in_list(
                ctx.arena,
                select.list,
                candidate.spec,
                Some(attr),
                replacement,
            )?;
            if list_changed {
                if let Some(payload) = ctx.arena[stmt].as_select_mut() {
                    payload.list = new_list;
                }
                changed = true;
            }
        }
    }
    Ok(changed)
}

fn mentions_attr(arena: &NodeArena, root: NodeId, spec: SpecId, attr: &str) -> bool {
    any_node(arena, root, WalkScope::SkipQueries, |_, node| {
        matches!(
            &node.kind,
            NodeKind::Name(name) if name.spec_id == spec && name.original == attr
        )
    })
}

fn distinct_spec_count(arena: &NodeArena, root: NodeId) -> usize {
    let mut specs = FxHashSet::default();
    requel_model::visit::for_each_node(arena, root, WalkScope::SkipQueries, &mut |_, node| {
        if let NodeKind::Name(name) = &node.kind {
            specs.insert(name.spec_id);
        }
    });
    specs.len()
}

fn is_duplicate(arena: &NodeArena, stmt: NodeId, clause: Clause, copy: NodeId) -> bool {
    arena
        .list(clause_head(arena, stmt, clause))
        .into_iter()
        .any(|c| arena[c].location == arena[copy].location && arena.trees_equal(c, copy))
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
    fn constant_flows_into_other_conjuncts() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a1 = b.name(t, "a");
        let five = b.int(5);
        let p1 = b.eq(a1, five);
        let a2 = b.name(t, "a");
        let bb = b.name(t, "b");
        let p2 = b.lt(a2, bb);
        let col = b.name(t, "b");
        let select = b
            .select()
            .column(col)
            .from(t)
            .predicate(p1)
            .predicate(p2)
            .build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.b FROM t WHERE t.a = 5 AND 5 < t.b"
        );
    }

    #[test]
    fn join_edges_get_a_transitive_copy() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let u = b.class_spec("u", "u");
        let ta = b.name(t, "a");
        let ub = b.name(u, "b");
        let join = b.eq(ta, ub);
        let ub2 = b.name(u, "b");
        let five = b.int(5);
        let sarg = b.eq(ub2, five);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(requel_model::JoinType::None, u, vec![])
            .predicate(join)
            .predicate(sarg)
            .build(&mut b);

        let mut arena = b.into_arena();
        let mut host_vars = Vec::new();
        let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
        apply(&mut ctx, select, Clause::Where).unwrap();
        assert_eq!(
            arena.sql(select),
            "SELECT t.a FROM t, u WHERE t.a = u.b AND u.b = 5 AND t.a = 5"
        );
        // The copy is marked; the original join edge is not.
        let where_list = arena.list(clause_head(&arena, select, Clause::Where));
        let copy = where_list[2];
        assert!(arena[copy].as_expr().unwrap().flags.transitive);
        assert!(!arena[where_list[0]].as_expr().unwrap().flags.transitive);
    }

    #[test]
    fn located_conjuncts_are_not_crossed() {
        let mut b = AstBuilder::new();
        let t = b.class_spec("t", "t");
        let a1 = b.name(t, "a");
        let five = b.int(5);
        let p1 = b.eq(a1, five);
        let a2 = b.name(t, "a");
        let ten = b.int(10);
        let p2 = b.lt(a2, ten);
        b.arena[p2].location = 2;
        let col = b.name(t, "b");
        let select = b
            .select()
            .column(col)
            .from(t)
            .predicate(p1)
            .predicate(p2)
            .build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.b FROM t WHERE t.a = 5 AND t.a < 10"
        );
    }

    #[test]
    fn derived_constant_column_propagates_the_constant() {
        let mut b = AstBuilder::new();
        let inner_t = b.class_spec("u", "u");
        let seven = b.int(7);
        let inner = b.select().column(seven).from(inner_t).build(&mut b);
        let d = b.derived_spec(inner, "d", &["k"]);
        let t = b.class_spec("t", "t");
        let k = b.name(d, "k");
        let ta = b.name(t, "a");
        let pred = b.lt(ta, k);
        let col = b.name(t, "a");
        let select = b
            .select()
            .column(col)
            .from(t)
            .join(requel_model::JoinType::None, d, vec![])
            .predicate(pred)
            .build(&mut b);
        assert_eq!(
            run(b, select),
            "SELECT t.a FROM t, (SELECT 7 FROM u) d (k) WHERE t.a < 7"
        );
    }
}

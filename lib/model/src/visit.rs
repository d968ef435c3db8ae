//! Read-only walks and in-place substitution over the node tree.
//!
//! Walks visit a node's payload children and its `or_next` disjunction
//! chain, but never follow the node's own `next` sibling: CNF conjunct
//! lists are iterated explicitly by the passes that own them. Chains that
//! hang *inside* a payload (select lists, function arguments) are expanded
//! at the owning node.

use crate::arena::{ArenaFull, NodeArena, NodeId};
use crate::node::{Node, NodeKind, SpecId};
use crate::ops::ExprOp;
use crate::value::ValueData;

/// Whether a walk descends into subqueries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkScope {
    /// Visit subquery internals as well.
    IntoQueries,
    /// Treat Select/SetOp children as opaque leaves.
    SkipQueries,
}

/// Pushes the payload children of `id` (plus its `or_next`) onto `out`.
pub fn payload_children(arena: &NodeArena, id: NodeId, out: &mut Vec<NodeId>) {
    let node = arena.node(id);
    if let Some(or_next) = node.or_next {
        out.push(or_next);
    }
    match &node.kind {
        NodeKind::Select(select) => {
            push_list(arena, select.list, out);
            push_list(arena, select.from, out);
            push_list(arena, select.where_clause, out);
            push_list(arena, select.group_by, out);
            push_list(arena, select.having, out);
            push_list(arena, select.order_by, out);
            push_list(arena, select.orderby_for, out);
        }
        NodeKind::SetOp(set_op) => {
            out.push(set_op.left);
            out.push(set_op.right);
        }
        NodeKind::Update(update) => {
            out.push(update.spec);
            push_list(arena, update.assignments, out);
            push_list(arena, update.where_clause, out);
        }
        NodeKind::Delete(delete) => {
            out.push(delete.spec);
            push_list(arena, delete.where_clause, out);
        }
        NodeKind::Insert(insert) => {
            out.push(insert.spec);
            push_list(arena, insert.attr_list, out);
            match &insert.source {
                crate::node::InsertSource::Values(values) => push_list(arena, *values, out),
                crate::node::InsertSource::Query(query) => out.push(*query),
            }
        }
        NodeKind::Spec(spec) => {
            match &spec.source {
                crate::node::SpecSource::Class(_) => {}
                crate::node::SpecSource::Derived(query) => out.push(*query),
                crate::node::SpecSource::SetExpr(set) => out.push(*set),
            }
            push_list(arena, spec.on_cond, out);
            out.extend(spec.path_entities.iter().copied());
            push_list(arena, spec.path_conjuncts, out);
        }
        NodeKind::Expr(expr) => {
            out.extend([expr.arg1, expr.arg2, expr.arg3].into_iter().flatten());
        }
        NodeKind::Function(function) => push_list(arena, function.args, out),
        NodeKind::Dot(dot) => {
            out.push(dot.arg1);
            out.push(dot.arg2);
        }
        NodeKind::SortSpec(sort) => out.push(sort.expr),
        NodeKind::Value(value) => {
            if let ValueData::Set(elements) = &value.data {
                out.extend(elements.iter().copied());
            }
        }
        NodeKind::Name(_) | NodeKind::HostVar(_) => {}
    }
}

fn push_list(arena: &NodeArena, head: Option<NodeId>, out: &mut Vec<NodeId>) {
    out.extend(arena.list(head));
}

/// Depth-first preorder visit of `root` and its payload descendants.
pub fn for_each_node(
    arena: &NodeArena,
    root: NodeId,
    scope: WalkScope,
    f: &mut impl FnMut(NodeId, &Node),
) {
    let mut stack = vec![root];
    let mut children = Vec::new();
    while let Some(id) = stack.pop() {
        let node = arena.node(id);
        f(id, node);
        if scope == WalkScope::SkipQueries && node.is_query() && id != root {
            continue;
        }
        children.clear();
        payload_children(arena, id, &mut children);
        stack.extend(children.iter().rev());
    }
}

/// Whether any visited node satisfies `pred`.
pub fn any_node(
    arena: &NodeArena,
    root: NodeId,
    scope: WalkScope,
    pred: impl Fn(NodeId, &Node) -> bool,
) -> bool {
    let mut found = false;
    for_each_node(arena, root, scope, &mut |id, node| {
        found = found || pred(id, node);
    });
    found
}

/// Whether the tree references an attribute of the given spec, including
/// through correlated subqueries.
pub fn references_spec(arena: &NodeArena, root: NodeId, spec: SpecId) -> bool {
    any_node(arena, root, WalkScope::IntoQueries, |_, node| {
        matches!(&node.kind, NodeKind::Name(name) if name.spec_id == spec)
    })
}

/// Whether the tree contains an aggregate function call. Aggregates inside
/// subqueries belong to the inner query and are ignored.
pub fn contains_aggregate(arena: &NodeArena, root: NodeId) -> bool {
    any_node(arena, root, WalkScope::SkipQueries, |_, node| {
        matches!(&node.kind, NodeKind::Function(f) if f.kind.is_aggregate())
    })
}

/// Whether the tree contains INST_NUM / ORDERBY_NUM / GROUPBY_NUM.
pub fn contains_row_numbering(arena: &NodeArena, root: NodeId) -> bool {
    any_node(arena, root, WalkScope::SkipQueries, |_, node| {
        node.expr_op().is_some_and(ExprOp::is_row_numbering)
    })
}

/// Number of attribute references in the tree, not counting subquery
/// internals.
pub fn count_names(arena: &NodeArena, root: NodeId) -> usize {
    let mut count = 0;
    for_each_node(arena, root, WalkScope::SkipQueries, &mut |_, node| {
        if matches!(node.kind, NodeKind::Name(_)) {
            count += 1;
        }
    });
    count
}

/// Rewrites every Expr with operator `from` to operator `to`.
pub fn replace_op(arena: &mut NodeArena, root: NodeId, from: ExprOp, to: ExprOp) -> bool {
    let mut targets = Vec::new();
    for_each_node(arena, root, WalkScope::SkipQueries, &mut |id, node| {
        if node.expr_op() == Some(from) {
            targets.push(id);
        }
    });
    for &id in &targets {
        if let NodeKind::Expr(expr) = &mut arena.node_mut(id).kind {
            expr.op = to;
        }
    }
    !targets.is_empty()
}

fn name_matches(arena: &NodeArena, id: NodeId, spec: SpecId, attr: Option<&str>) -> bool {
    matches!(
        &arena.node(id).kind,
        NodeKind::Name(name) if name.spec_id == spec
            && attr.map_or(true, |attr| name.original == attr)
    )
}

/// Replaces every reference to `spec.attr` inside the tree rooted at `root`
/// with a deep copy of `replacement`; `attr` of `None` matches every
/// attribute of the spec. Subqueries are left untouched (conservative: a
/// missed substitution only declines a later rewrite). `root` itself is not
/// replaced; use [substitute_in_list] where the root position may match.
pub fn substitute_in_tree(
    arena: &mut NodeArena,
    root: NodeId,
    spec: SpecId,
    attr: Option<&str>,
    replacement: NodeId,
) -> Result<bool, ArenaFull> {
    let mut changed = false;

    // The or_next chain of the root is part of the disjunction it heads.
    let or_ids = arena.or_list(arena.node(root).or_next);
    for or_id in or_ids {
        changed |= substitute_in_tree(arena, or_id, spec, attr, replacement)?;
    }

    let node = arena.node(root);
    match &node.kind {
        NodeKind::Expr(expr) => {
            let args = [expr.arg1, expr.arg2, expr.arg3];
            let mut new_args = args;
            for (slot, arg) in args.iter().enumerate() {
                if let Some(arg) = arg {
                    new_args[slot] = Some(substitute_child(
                        arena,
                        *arg,
                        spec,
                        attr,
                        replacement,
                        &mut changed,
                    )?);
                }
            }
            if let NodeKind::Expr(expr) = &mut arena.node_mut(root).kind {
                [expr.arg1, expr.arg2, expr.arg3] = new_args;
            }
        }
        NodeKind::Function(function) => {
            let args = function.args;
            let (head, list_changed) =
                substitute_in_list(arena, args, spec, attr, replacement)?;
            changed |= list_changed;
            if let NodeKind::Function(function) = &mut arena.node_mut(root).kind {
                function.args = head;
            }
        }
        NodeKind::Dot(dot) => {
            let (arg1, arg2) = (dot.arg1, dot.arg2);
            let new1 = substitute_child(arena, arg1, spec, attr, replacement, &mut changed)?;
            let new2 = substitute_child(arena, arg2, spec, attr, replacement, &mut changed)?;
            if let NodeKind::Dot(dot) = &mut arena.node_mut(root).kind {
                dot.arg1 = new1;
                dot.arg2 = new2;
            }
        }
        NodeKind::SortSpec(sort) => {
            let expr = sort.expr;
            let new = substitute_child(arena, expr, spec, attr, replacement, &mut changed)?;
            if let NodeKind::SortSpec(sort) = &mut arena.node_mut(root).kind {
                sort.expr = new;
            }
        }
        NodeKind::Value(value) => {
            if let ValueData::Set(elements) = &value.data {
                let elements = elements.clone();
                let mut new_elements = elements.clone();
                for (slot, element) in elements.iter().enumerate() {
                    new_elements[slot] =
                        substitute_child(arena, *element, spec, attr, replacement, &mut changed)?;
                }
                if let NodeKind::Value(value) = &mut arena.node_mut(root).kind {
                    value.data = ValueData::Set(new_elements);
                }
            }
        }
        // Subqueries are opaque; leaves have nothing to do.
        _ => {}
    }
    Ok(changed)
}

fn substitute_child(
    arena: &mut NodeArena,
    child: NodeId,
    spec: SpecId,
    attr: Option<&str>,
    replacement: NodeId,
    changed: &mut bool,
) -> Result<NodeId, ArenaFull> {
    if name_matches(arena, child, spec, attr) {
        *changed = true;
        arena.copy_tree(replacement)
    } else {
        if substitute_in_tree(arena, child, spec, attr, replacement)? {
            *changed = true;
        }
        Ok(child)
    }
}

/// [substitute_in_tree] over a `next`-chained list whose elements may
/// themselves be matching references (e.g. a select list). Returns the new
/// head.
pub fn substitute_in_list(
    arena: &mut NodeArena,
    head: Option<NodeId>,
    spec: SpecId,
    attr: Option<&str>,
    replacement: NodeId,
) -> Result<(Option<NodeId>, bool), ArenaFull> {
    let ids = arena.list(head);
    let mut changed = false;
    let mut new_ids = Vec::with_capacity(ids.len());
    for id in ids {
        if name_matches(arena, id, spec, attr) {
            let copy = arena.copy_tree(replacement)?;
            changed = true;
            new_ids.push(copy);
        } else {
            changed |= substitute_in_tree(arena, id, spec, attr, replacement)?;
            new_ids.push(id);
        }
    }
    Ok((arena.relink(&new_ids), changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Expr, FunctionCall, FunctionKind, Name, NameMetaClass, Node};
    use crate::types::SqlType;

    fn name(arena: &mut NodeArena, spec: u32, attr: &str) -> NodeId {
        arena
            .new_name(
                Name {
                    original: attr.into(),
                    resolved: "t".into(),
                    spec_id: SpecId(spec),
                    meta_class: NameMetaClass::Normal,
                },
                SqlType::Integer,
            )
            .unwrap()
    }

    #[test]
    fn references_spec_sees_or_chain() {
        let mut arena = NodeArena::new();
        let a = name(&mut arena, 1, "a");
        let b = name(&mut arena, 2, "b");
        let five = arena
            .new_value(ValueData::Int(5), SqlType::Integer)
            .unwrap();
        let left = arena.binary_pred(ExprOp::Eq, a, five).unwrap();
        let five2 = arena
            .new_value(ValueData::Int(5), SqlType::Integer)
            .unwrap();
        let right = arena.binary_pred(ExprOp::Eq, b, five2).unwrap();
        arena[left].or_next = Some(right);

        assert!(references_spec(&arena, left, SpecId(1)));
        assert!(references_spec(&arena, left, SpecId(2)));
        assert!(!references_spec(&arena, left, SpecId(3)));
    }

    #[test]
    fn aggregate_detection_ignores_subqueries() {
        let mut arena = NodeArena::new();
        let arg = name(&mut arena, 1, "x");
        let agg = arena.alloc(Node::typed(
            NodeKind::Function(Box::new(FunctionCall {
                kind: FunctionKind::Max,
                args: Some(arg),
            })),
            SqlType::Integer,
        ));
        assert!(contains_aggregate(&arena, agg));

        // The same call nested inside a subquery does not count.
        let inner = crate::node::Select {
            list: Some(agg),
            ..crate::node::Select::default()
        };
        let subquery = arena.alloc(Node::new(NodeKind::Select(Box::new(inner))));
        let outer = name(&mut arena, 2, "y");
        let pred = arena.binary_pred(ExprOp::Eq, outer, subquery).unwrap();
        assert!(!contains_aggregate(&arena, pred));
    }

    #[test]
    fn substitution_replaces_within_expressions() {
        let mut arena = NodeArena::new();
        let a = name(&mut arena, 1, "a");
        let b = name(&mut arena, 1, "b");
        let sum = arena
            .new_expr(Expr::binary(ExprOp::Plus, a, b))
            .unwrap();
        let ten = arena
            .new_value(ValueData::Int(10), SqlType::Integer)
            .unwrap();
        let pred = arena.binary_pred(ExprOp::Lt, sum, ten).unwrap();

        let five = arena
            .new_value(ValueData::Int(5), SqlType::Integer)
            .unwrap();
        let changed = substitute_in_tree(&mut arena, pred, SpecId(1), Some("a"), five).unwrap();
        assert!(changed);
        assert_eq!(arena.sql(pred), "5 + t.b < 10");
    }

    #[test]
    fn substitution_skips_other_specs() {
        let mut arena = NodeArena::new();
        let a = name(&mut arena, 2, "a");
        let ten = arena
            .new_value(ValueData::Int(10), SqlType::Integer)
            .unwrap();
        let pred = arena.binary_pred(ExprOp::Lt, a, ten).unwrap();
        let five = arena
            .new_value(ValueData::Int(5), SqlType::Integer)
            .unwrap();
        let changed = substitute_in_tree(&mut arena, pred, SpecId(1), Some("a"), five).unwrap();
        assert!(!changed);
    }

    #[test]
    fn count_names_counts_both_sides() {
        let mut arena = NodeArena::new();
        let a = name(&mut arena, 1, "a");
        let b = name(&mut arena, 2, "b");
        let pred = arena.binary_pred(ExprOp::Eq, a, b).unwrap();
        assert_eq!(count_names(&arena, pred), 2);
    }
}

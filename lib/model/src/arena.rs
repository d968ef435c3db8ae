use crate::node::{Expr, ExprFlags, HostVar, Name, Node, NodeKind, Value};
use crate::ops::ExprOp;
use crate::types::SqlType;
use crate::value::ValueData;
use std::ops::{Index, IndexMut};

/// Dense handle into a [NodeArena].
///
/// Handles are plain indices; they stay valid across arena growth but must
/// never outlive the arena. Back-references like `spec_id` are handles of
/// their own kind, not node ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The arena exhausted its backing storage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("node arena exhausted")]
pub struct ArenaFull;

/// Owner of every node of one parsed statement.
///
/// The rewriter allocates new nodes here, detaches and re-parents subtrees,
/// and simply abandons subtrees it no longer needs; the arena is dropped as
/// a whole when the statement is done.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates a node, reporting exhaustion instead of aborting.
    pub fn try_alloc(&mut self, node: Node) -> Result<NodeId, ArenaFull> {
        self.nodes.try_reserve(1).map_err(|_| ArenaFull)?;
        let id = u32::try_from(self.nodes.len()).map_err(|_| ArenaFull)?;
        self.nodes.push(node);
        Ok(NodeId(id))
    }

    /// Infallible allocation for construction-time use (parsers, builders).
    #[allow(clippy::expect_used, reason = "construction-time API, mirrors Vec::push")]
    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.try_alloc(node).expect("node arena exhausted")
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    // ---- chain helpers -------------------------------------------------

    /// Collects a `next`-linked list into ids.
    pub fn list(&self, head: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.nodes[id.index()].next;
        }
        out
    }

    /// Collects an `or_next`-linked disjunction chain into ids.
    pub fn or_list(&self, head: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.nodes[id.index()].or_next;
        }
        out
    }

    /// Rebuilds a `next` chain from `ids`, returning the new head.
    pub fn relink(&mut self, ids: &[NodeId]) -> Option<NodeId> {
        for window in ids.windows(2) {
            self.nodes[window[0].index()].next = Some(window[1]);
        }
        if let Some(&last) = ids.last() {
            self.nodes[last.index()].next = None;
        }
        ids.first().copied()
    }

    /// Rebuilds an `or_next` chain from `ids`, returning the new head.
    pub fn relink_or(&mut self, ids: &[NodeId]) -> Option<NodeId> {
        for window in ids.windows(2) {
            self.nodes[window[0].index()].or_next = Some(window[1]);
        }
        if let Some(&last) = ids.last() {
            self.nodes[last.index()].or_next = None;
        }
        ids.first().copied()
    }

    /// Appends `tail` (itself possibly a chain) to the `next` chain starting
    /// at `head`; returns the head of the combined chain.
    pub fn concat(&mut self, head: Option<NodeId>, tail: Option<NodeId>) -> Option<NodeId> {
        let Some(head) = head else {
            return tail;
        };
        let mut cursor = head;
        while let Some(next) = self.nodes[cursor.index()].next {
            cursor = next;
        }
        self.nodes[cursor.index()].next = tail;
        Some(head)
    }

    // ---- construction shortcuts ---------------------------------------

    pub fn new_value(&mut self, data: ValueData, type_enum: SqlType) -> Result<NodeId, ArenaFull> {
        self.try_alloc(Node::typed(NodeKind::Value(Value { data }), type_enum))
    }

    pub fn new_bool(&mut self, b: bool) -> Result<NodeId, ArenaFull> {
        self.new_value(ValueData::Bool(b), SqlType::Logical)
    }

    pub fn new_null(&mut self) -> Result<NodeId, ArenaFull> {
        self.new_value(ValueData::Null, SqlType::None)
    }

    pub fn new_host_var(&mut self, index: u32, type_enum: SqlType) -> Result<NodeId, ArenaFull> {
        self.try_alloc(Node::typed(NodeKind::HostVar(HostVar { index }), type_enum))
    }

    pub fn new_expr(&mut self, expr: Expr) -> Result<NodeId, ArenaFull> {
        self.try_alloc(Node::typed(NodeKind::Expr(expr), SqlType::Logical))
    }

    pub fn new_name(&mut self, name: Name, type_enum: SqlType) -> Result<NodeId, ArenaFull> {
        self.try_alloc(Node::typed(NodeKind::Name(name), type_enum))
    }

    // ---- copying -------------------------------------------------------

    /// Deep-copies a node with its payload and `or_next` chain. The copy's
    /// `next` is cleared; use [Self::copy_list] to copy a whole conjunct
    /// list.
    pub fn copy_tree(&mut self, id: NodeId) -> Result<NodeId, ArenaFull> {
        let copy = self.copy_without_next(id)?;
        let or_next = self.nodes[id.index()].or_next;
        if let Some(or_next) = or_next {
            let or_copy = self.copy_tree(or_next)?;
            self.nodes[copy.index()].or_next = Some(or_copy);
        }
        Ok(copy)
    }

    /// Deep-copies a node and its whole `next` chain.
    pub fn copy_list(&mut self, id: NodeId) -> Result<NodeId, ArenaFull> {
        let head = self.copy_tree(id)?;
        let mut src_cursor = self.nodes[id.index()].next;
        let mut dst_cursor = head;
        while let Some(src) = src_cursor {
            let copy = self.copy_tree(src)?;
            self.nodes[dst_cursor.index()].next = Some(copy);
            dst_cursor = copy;
            src_cursor = self.nodes[src.index()].next;
        }
        Ok(head)
    }

    fn copy_without_next(&mut self, id: NodeId) -> Result<NodeId, ArenaFull> {
        let mut node = self.nodes[id.index()].clone();
        node.next = None;
        node.or_next = None;
        node.kind = self.copy_kind(node.kind)?;
        self.try_alloc(node)
    }

    fn copy_kind(&mut self, kind: NodeKind) -> Result<NodeKind, ArenaFull> {
        let kind = match kind {
            NodeKind::Select(mut select) => {
                select.list = self.copy_list_opt(select.list)?;
                select.from = self.copy_list_opt(select.from)?;
                select.where_clause = self.copy_list_opt(select.where_clause)?;
                select.group_by = self.copy_list_opt(select.group_by)?;
                select.having = self.copy_list_opt(select.having)?;
                select.order_by = self.copy_list_opt(select.order_by)?;
                select.orderby_for = self.copy_list_opt(select.orderby_for)?;
                NodeKind::Select(select)
            }
            NodeKind::SetOp(mut set_op) => {
                set_op.left = self.copy_tree(set_op.left)?;
                set_op.right = self.copy_tree(set_op.right)?;
                NodeKind::SetOp(set_op)
            }
            NodeKind::Update(mut update) => {
                update.spec = self.copy_tree(update.spec)?;
                update.assignments = self.copy_list_opt(update.assignments)?;
                update.where_clause = self.copy_list_opt(update.where_clause)?;
                NodeKind::Update(update)
            }
            NodeKind::Delete(mut delete) => {
                delete.spec = self.copy_tree(delete.spec)?;
                delete.where_clause = self.copy_list_opt(delete.where_clause)?;
                NodeKind::Delete(delete)
            }
            NodeKind::Insert(mut insert) => {
                insert.spec = self.copy_tree(insert.spec)?;
                insert.attr_list = self.copy_list_opt(insert.attr_list)?;
                insert.source = match insert.source {
                    crate::node::InsertSource::Values(values) => {
                        crate::node::InsertSource::Values(self.copy_list_opt(values)?)
                    }
                    crate::node::InsertSource::Query(query) => {
                        crate::node::InsertSource::Query(self.copy_tree(query)?)
                    }
                };
                NodeKind::Insert(insert)
            }
            NodeKind::Spec(mut spec) => {
                spec.source = match spec.source {
                    crate::node::SpecSource::Class(name) => crate::node::SpecSource::Class(name),
                    crate::node::SpecSource::Derived(query) => {
                        crate::node::SpecSource::Derived(self.copy_tree(query)?)
                    }
                    crate::node::SpecSource::SetExpr(set) => {
                        crate::node::SpecSource::SetExpr(self.copy_tree(set)?)
                    }
                };
                spec.on_cond = self.copy_list_opt(spec.on_cond)?;
                spec.path_entities = spec
                    .path_entities
                    .into_iter()
                    .map(|e| self.copy_tree(e))
                    .collect::<Result<_, _>>()?;
                spec.path_conjuncts = self.copy_list_opt(spec.path_conjuncts)?;
                NodeKind::Spec(spec)
            }
            NodeKind::Expr(mut expr) => {
                expr.arg1 = self.copy_tree_opt(expr.arg1)?;
                expr.arg2 = self.copy_tree_opt(expr.arg2)?;
                expr.arg3 = self.copy_tree_opt(expr.arg3)?;
                NodeKind::Expr(expr)
            }
            NodeKind::Function(mut function) => {
                function.args = self.copy_list_opt(function.args)?;
                NodeKind::Function(function)
            }
            NodeKind::Dot(mut dot) => {
                dot.arg1 = self.copy_tree(dot.arg1)?;
                dot.arg2 = self.copy_tree(dot.arg2)?;
                NodeKind::Dot(dot)
            }
            NodeKind::SortSpec(mut sort) => {
                sort.expr = self.copy_tree(sort.expr)?;
                NodeKind::SortSpec(sort)
            }
            NodeKind::Value(mut value) => {
                if let ValueData::Set(elements) = value.data {
                    let elements = elements
                        .into_iter()
                        .map(|e| self.copy_tree(e))
                        .collect::<Result<_, _>>()?;
                    value.data = ValueData::Set(elements);
                }
                NodeKind::Value(value)
            }
            leaf @ (NodeKind::Name(_) | NodeKind::HostVar(_)) => leaf,
        };
        Ok(kind)
    }

    fn copy_tree_opt(&mut self, id: Option<NodeId>) -> Result<Option<NodeId>, ArenaFull> {
        id.map(|id| self.copy_tree(id)).transpose()
    }

    fn copy_list_opt(&mut self, id: Option<NodeId>) -> Result<Option<NodeId>, ArenaFull> {
        id.map(|id| self.copy_list(id)).transpose()
    }

    // ---- structural equality ------------------------------------------

    /// Structural equality of two subtrees including their `or_next` chains.
    ///
    /// Ignores `next` siblings, `location` and Expr flags, so two conjuncts
    /// from different clauses compare equal when they test the same thing.
    pub fn trees_equal(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let na = self.node(a);
        let nb = self.node(b);
        if na.type_enum != nb.type_enum {
            return false;
        }
        if !self.kinds_equal(&na.kind, &nb.kind) {
            return false;
        }
        match (na.or_next, nb.or_next) {
            (None, None) => true,
            (Some(a), Some(b)) => self.trees_equal(a, b),
            _ => false,
        }
    }

    fn ids_equal(&self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.trees_equal(a, b),
            _ => false,
        }
    }

    fn lists_equal(&self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        let la = self.list(a);
        let lb = self.list(b);
        la.len() == lb.len() && la.iter().zip(&lb).all(|(&x, &y)| self.trees_equal(x, y))
    }

    fn kinds_equal(&self, a: &NodeKind, b: &NodeKind) -> bool {
        match (a, b) {
            (NodeKind::Name(a), NodeKind::Name(b)) => a.same_attribute(b),
            (NodeKind::Value(a), NodeKind::Value(b)) => match (&a.data, &b.data) {
                (ValueData::Set(xs), ValueData::Set(ys)) => {
                    xs.len() == ys.len()
                        && xs.iter().zip(ys).all(|(&x, &y)| self.trees_equal(x, y))
                }
                (x, y) => x == y,
            },
            (NodeKind::HostVar(a), NodeKind::HostVar(b)) => a == b,
            (NodeKind::Expr(a), NodeKind::Expr(b)) => {
                a.op == b.op
                    && a.cast_type == b.cast_type
                    && self.ids_equal(a.arg1, b.arg1)
                    && self.ids_equal(a.arg2, b.arg2)
                    && self.ids_equal(a.arg3, b.arg3)
            }
            (NodeKind::Function(a), NodeKind::Function(b)) => {
                a.kind == b.kind && self.lists_equal(a.args, b.args)
            }
            (NodeKind::Dot(a), NodeKind::Dot(b)) => {
                self.trees_equal(a.arg1, b.arg1) && self.trees_equal(a.arg2, b.arg2)
            }
            (NodeKind::SortSpec(a), NodeKind::SortSpec(b)) => {
                a.asc == b.asc && a.pos == b.pos && self.trees_equal(a.expr, b.expr)
            }
            // Statements and specs are compared by identity only; the
            // rewriter never needs structural equality over them.
            _ => false,
        }
    }

    // ---- expression shortcuts -----------------------------------------

    /// Builds `lhs op rhs` typed LOGICAL.
    pub fn binary_pred(
        &mut self,
        op: ExprOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, ArenaFull> {
        self.new_expr(Expr::binary(op, lhs, rhs))
    }

    /// Builds a predicate with the given flags.
    pub fn flagged_pred(
        &mut self,
        op: ExprOp,
        lhs: NodeId,
        rhs: NodeId,
        flags: ExprFlags,
    ) -> Result<NodeId, ArenaFull> {
        let id = self.new_expr(Expr {
            flags,
            ..Expr::binary(op, lhs, rhs)
        })?;
        Ok(id)
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.node(id)
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.node_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Name, NameMetaClass, SpecId};

    fn name(arena: &mut NodeArena, attr: &str) -> NodeId {
        arena
            .new_name(
                Name {
                    original: attr.into(),
                    resolved: "t".into(),
                    spec_id: SpecId(1),
                    meta_class: NameMetaClass::Normal,
                },
                SqlType::Integer,
            )
            .unwrap()
    }

    #[test]
    fn list_round_trip() {
        let mut arena = NodeArena::new();
        let a = arena.new_bool(true).unwrap();
        let b = arena.new_bool(false).unwrap();
        let c = arena.new_null().unwrap();
        let head = arena.relink(&[a, b, c]);
        assert_eq!(arena.list(head), vec![a, b, c]);

        let head = arena.relink(&[c, a]);
        assert_eq!(arena.list(head), vec![c, a]);
        assert_eq!(arena[a].next, None);
    }

    #[test]
    fn concat_appends_to_tail() {
        let mut arena = NodeArena::new();
        let a = arena.new_bool(true).unwrap();
        let b = arena.new_bool(false).unwrap();
        let head = arena.concat(Some(a), Some(b));
        assert_eq!(arena.list(head), vec![a, b]);
        assert_eq!(arena.concat(None, Some(b)), Some(b));
    }

    #[test]
    fn copy_tree_is_structural_copy() {
        let mut arena = NodeArena::new();
        let lhs = name(&mut arena, "a");
        let rhs = arena
            .new_value(ValueData::Int(5), SqlType::Integer)
            .unwrap();
        let pred = arena.binary_pred(ExprOp::Eq, lhs, rhs).unwrap();

        let copy = arena.copy_tree(pred).unwrap();
        assert_ne!(copy, pred);
        assert!(arena.trees_equal(copy, pred));
    }

    #[test]
    fn trees_equal_ignores_location() {
        let mut arena = NodeArena::new();
        let a = name(&mut arena, "a");
        let b = name(&mut arena, "a");
        arena[b].location = 2;
        assert!(arena.trees_equal(a, b));

        let c = name(&mut arena, "c");
        assert!(!arena.trees_equal(a, c));
    }

    #[test]
    fn trees_equal_covers_or_chains() {
        let mut arena = NodeArena::new();
        let a1 = name(&mut arena, "a");
        let a2 = name(&mut arena, "a");
        let b1 = name(&mut arena, "b");
        let b2 = name(&mut arena, "b");
        arena[a1].or_next = Some(b1);
        arena[a2].or_next = Some(b2);
        assert!(arena.trees_equal(a1, a2));

        arena[a2].or_next = None;
        assert!(!arena.trees_equal(a1, a2));
    }
}

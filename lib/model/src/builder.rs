//! Programmatic AST construction.
//!
//! [AstBuilder] plays the role of the parser for embedders and tests: it
//! owns the arena, hands out typed leaf nodes and predicates, and
//! [SelectBuilder] assembles whole statements with spec ids and locations
//! assigned the way the parser would.

use crate::arena::{NodeArena, NodeId};
use crate::node::{
    Delete, Expr, FunctionCall, FunctionKind, JoinType, Name, NameMetaClass, Node, NodeKind,
    Select, SetOp, SetOpKind, SortSpec, Spec, SpecId, SpecMetaClass, SpecSource, Update,
};
use crate::ops::{BetweenVariant, ExprOp};
use crate::types::{DataTypeDescriptor, SqlType};
use crate::value::ValueData;

#[derive(Debug, Default)]
pub struct AstBuilder {
    pub arena: NodeArena,
    next_spec: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the builder, returning the arena.
    pub fn into_arena(self) -> NodeArena {
        self.arena
    }

    // ---- literals ------------------------------------------------------

    pub fn int(&mut self, v: i64) -> NodeId {
        self.arena
            .alloc(Node::typed(value(ValueData::Int(v)), SqlType::Integer))
    }

    pub fn double(&mut self, v: f64) -> NodeId {
        self.arena
            .alloc(Node::typed(value(ValueData::Double(v)), SqlType::Double))
    }

    pub fn string(&mut self, s: &str) -> NodeId {
        let mut node = Node::typed(value(ValueData::Str(s.into())), SqlType::VarChar);
        node.data_type = Some(DataTypeDescriptor::precision(
            u16::try_from(s.len()).unwrap_or(u16::MAX),
        ));
        self.arena.alloc(node)
    }

    pub fn bool_lit(&mut self, b: bool) -> NodeId {
        self.arena
            .alloc(Node::typed(value(ValueData::Bool(b)), SqlType::Logical))
    }

    pub fn null_lit(&mut self) -> NodeId {
        self.arena.alloc(Node::new(value(ValueData::Null)))
    }

    pub fn set_of(&mut self, elements: Vec<NodeId>) -> NodeId {
        let element_type = elements
            .first()
            .map(|&e| self.arena[e].type_enum)
            .unwrap_or(SqlType::None);
        let mut node = Node::typed(value(ValueData::Set(elements)), SqlType::Set);
        node.data_type = Some(DataTypeDescriptor::collection(element_type));
        self.arena.alloc(node)
    }

    pub fn host_var(&mut self, index: u32, type_enum: SqlType) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::HostVar(crate::node::HostVar { index }),
            type_enum,
        ))
    }

    // ---- specs and names ----------------------------------------------

    /// A FROM entry over a named class.
    pub fn class_spec(&mut self, class: &str, alias: &str) -> NodeId {
        let id = self.fresh_spec_id();
        self.arena.alloc(Node::new(NodeKind::Spec(Box::new(Spec {
            id,
            source: SpecSource::Class(class.into()),
            range_var: alias.into(),
            as_attr_list: Vec::new(),
            join_type: JoinType::None,
            on_cond: None,
            path_entities: Vec::new(),
            path_conjuncts: None,
            meta_class: SpecMetaClass::Regular,
            derived_table_type: None,
        }))))
    }

    /// A FROM entry over a derived table.
    pub fn derived_spec(&mut self, query: NodeId, alias: &str, columns: &[&str]) -> NodeId {
        let id = self.fresh_spec_id();
        self.arena.alloc(Node::new(NodeKind::Spec(Box::new(Spec {
            id,
            source: SpecSource::Derived(query),
            range_var: alias.into(),
            as_attr_list: columns.iter().map(|c| (*c).into()).collect(),
            join_type: JoinType::None,
            on_cond: None,
            path_entities: Vec::new(),
            path_conjuncts: None,
            meta_class: SpecMetaClass::Regular,
            derived_table_type: Some(crate::node::DerivedTableType::Subquery),
        }))))
    }

    pub fn fresh_spec_id(&mut self) -> SpecId {
        self.next_spec += 1;
        SpecId(self.next_spec)
    }

    #[allow(clippy::expect_used, reason = "builder misuse, not a runtime condition")]
    fn spec_of(&self, spec: NodeId) -> &Spec {
        self.arena[spec].as_spec().expect("not a spec node")
    }

    pub fn spec_id(&self, spec: NodeId) -> SpecId {
        self.spec_of(spec).id
    }

    /// An INTEGER attribute reference on `spec`.
    pub fn name(&mut self, spec: NodeId, attr: &str) -> NodeId {
        self.typed_name(spec, attr, SqlType::Integer, None)
    }

    pub fn typed_name(
        &mut self,
        spec: NodeId,
        attr: &str,
        type_enum: SqlType,
        data_type: Option<DataTypeDescriptor>,
    ) -> NodeId {
        let (spec_id, resolved) = {
            let spec = self.spec_of(spec);
            (spec.id, spec.range_var.clone())
        };
        let mut node = Node::typed(
            NodeKind::Name(Name {
                original: attr.into(),
                resolved,
                spec_id,
                meta_class: NameMetaClass::Normal,
            }),
            type_enum,
        );
        node.data_type = data_type;
        self.arena.alloc(node)
    }

    /// The OID pseudo-attribute of a spec.
    pub fn oid_name(&mut self, spec: NodeId) -> NodeId {
        let (spec_id, resolved) = {
            let spec = self.spec_of(spec);
            (spec.id, spec.range_var.clone())
        };
        self.arena.alloc(Node::typed(
            NodeKind::Name(Name {
                original: "oid".into(),
                resolved,
                spec_id,
                meta_class: NameMetaClass::OidAttr,
            }),
            SqlType::Object,
        ))
    }

    // ---- predicates and expressions -----------------------------------

    pub fn cmp(&mut self, op: ExprOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arena
            .alloc(Node::typed(NodeKind::Expr(Expr::binary(op, lhs, rhs)), SqlType::Logical))
    }

    pub fn eq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Eq, lhs, rhs)
    }

    pub fn ne(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Ne, lhs, rhs)
    }

    pub fn lt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Lt, lhs, rhs)
    }

    pub fn le(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Le, lhs, rhs)
    }

    pub fn gt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Gt, lhs, rhs)
    }

    pub fn ge(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Ge, lhs, rhs)
    }

    pub fn like(&mut self, lhs: NodeId, pattern: &str) -> NodeId {
        let pattern = self.string(pattern);
        self.cmp(ExprOp::Like, lhs, pattern)
    }

    pub fn between(&mut self, attr: NodeId, lower: NodeId, upper: NodeId) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::Expr(Expr::ternary(
                ExprOp::Between(BetweenVariant::And),
                attr,
                lower,
                upper,
            )),
            SqlType::Logical,
        ))
    }

    pub fn in_set(&mut self, attr: NodeId, elements: Vec<NodeId>) -> NodeId {
        let set = self.set_of(elements);
        self.cmp(ExprOp::In, attr, set)
    }

    pub fn in_query(&mut self, attr: NodeId, query: NodeId) -> NodeId {
        self.cmp(ExprOp::In, attr, query)
    }

    /// `lhs op SOME (query)` for `op` one of `<`, `<=`, `>`, `>=`.
    #[allow(clippy::panic, reason = "builder misuse, not a runtime condition")]
    pub fn some_cmp(&mut self, op: ExprOp, lhs: NodeId, query: NodeId) -> NodeId {
        let some_op = match op {
            ExprOp::Lt => ExprOp::LtSome,
            ExprOp::Le => ExprOp::LeSome,
            ExprOp::Gt => ExprOp::GtSome,
            ExprOp::Ge => ExprOp::GeSome,
            _ => panic!("not a quantifiable comparison"),
        };
        self.cmp(some_op, lhs, query)
    }

    pub fn is_null(&mut self, arg: NodeId) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::Expr(Expr::unary(ExprOp::IsNull, arg)),
            SqlType::Logical,
        ))
    }

    pub fn is_not_null(&mut self, arg: NodeId) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::Expr(Expr::unary(ExprOp::IsNotNull, arg)),
            SqlType::Logical,
        ))
    }

    pub fn not(&mut self, arg: NodeId) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::Expr(Expr::unary(ExprOp::Not, arg)),
            SqlType::Logical,
        ))
    }

    pub fn and(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.cmp(ExprOp::Or, lhs, rhs)
    }

    pub fn plus(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let node = Node::typed(
            NodeKind::Expr(Expr::binary(ExprOp::Plus, lhs, rhs)),
            self.arena[lhs].type_enum,
        );
        self.arena.alloc(node)
    }

    pub fn unary_minus(&mut self, arg: NodeId) -> NodeId {
        let node = Node::typed(
            NodeKind::Expr(Expr::unary(ExprOp::UnaryMinus, arg)),
            self.arena[arg].type_enum,
        );
        self.arena.alloc(node)
    }

    pub fn row_number(&mut self, op: ExprOp) -> NodeId {
        self.arena.alloc(Node::typed(
            NodeKind::Expr(Expr {
                op,
                arg1: None,
                arg2: None,
                arg3: None,
                cast_type: None,
                flags: crate::node::ExprFlags::default(),
            }),
            SqlType::Integer,
        ))
    }

    pub fn func(&mut self, kind: FunctionKind, args: Vec<NodeId>) -> NodeId {
        let type_enum = args
            .first()
            .map(|&a| self.arena[a].type_enum)
            .unwrap_or(SqlType::Integer);
        let head = self.arena.relink(&args);
        self.arena.alloc(Node::typed(
            NodeKind::Function(Box::new(FunctionCall { kind, args: head })),
            type_enum,
        ))
    }

    pub fn dot(&mut self, arg1: NodeId, arg2: NodeId) -> NodeId {
        let type_enum = self.arena[arg2].type_enum;
        self.arena.alloc(Node::typed(
            NodeKind::Dot(crate::node::Dot { arg1, arg2 }),
            type_enum,
        ))
    }

    // ---- sort specs ----------------------------------------------------

    pub fn sort(&mut self, expr: NodeId, asc: bool) -> NodeId {
        self.arena.alloc(Node::new(NodeKind::SortSpec(SortSpec {
            expr,
            asc,
            pos: None,
        })))
    }

    /// A positional ORDER BY item referring to select-list position `pos`
    /// (1-based); `expr` is the referenced expression.
    pub fn sort_pos(&mut self, pos: u32, expr: NodeId, asc: bool) -> NodeId {
        self.arena.alloc(Node::new(NodeKind::SortSpec(SortSpec {
            expr,
            asc,
            pos: Some(pos),
        })))
    }

    // ---- statements ----------------------------------------------------

    pub fn select(&self) -> SelectBuilder {
        SelectBuilder::default()
    }

    pub fn union(&mut self, left: NodeId, right: NodeId, all: bool) -> NodeId {
        self.set_op(SetOpKind::Union, left, right, all)
    }

    pub fn set_op(&mut self, op: SetOpKind, left: NodeId, right: NodeId, all: bool) -> NodeId {
        self.arena.alloc(Node::new(NodeKind::SetOp(Box::new(SetOp {
            op,
            left,
            right,
            all,
        }))))
    }

    pub fn update(
        &mut self,
        spec: NodeId,
        assignments: Vec<NodeId>,
        predicates: Vec<NodeId>,
    ) -> NodeId {
        let assignments = self.arena.relink(&assignments);
        let where_clause = self.arena.relink(&predicates);
        self.arena.alloc(Node::new(NodeKind::Update(Box::new(Update {
            spec,
            assignments,
            where_clause,
        }))))
    }

    pub fn delete(&mut self, spec: NodeId, predicates: Vec<NodeId>) -> NodeId {
        let where_clause = self.arena.relink(&predicates);
        self.arena.alloc(Node::new(NodeKind::Delete(Box::new(Delete {
            spec,
            where_clause,
        }))))
    }
}

fn value(data: ValueData) -> NodeKind {
    NodeKind::Value(crate::node::Value { data })
}

/// Accumulates the parts of one SELECT; [SelectBuilder::build] assigns spec
/// locations (1-based FROM positions) and links the chains.
#[derive(Debug, Default)]
pub struct SelectBuilder {
    columns: Vec<NodeId>,
    specs: Vec<(NodeId, JoinType, Vec<NodeId>)>,
    predicates: Vec<NodeId>,
    group_by: Vec<NodeId>,
    having: Vec<NodeId>,
    order_by: Vec<NodeId>,
    orderby_for: Vec<NodeId>,
    distinct: bool,
    ordered_hint: bool,
    correlation_level: u32,
}

impl SelectBuilder {
    pub fn column(mut self, expr: NodeId) -> Self {
        self.columns.push(expr);
        self
    }

    pub fn from(mut self, spec: NodeId) -> Self {
        self.specs.push((spec, JoinType::None, Vec::new()));
        self
    }

    pub fn join(mut self, join_type: JoinType, spec: NodeId, on: Vec<NodeId>) -> Self {
        self.specs.push((spec, join_type, on));
        self
    }

    /// Adds a WHERE conjunct.
    pub fn predicate(mut self, pred: NodeId) -> Self {
        self.predicates.push(pred);
        self
    }

    pub fn group_by(mut self, expr: NodeId) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, pred: NodeId) -> Self {
        self.having.push(pred);
        self
    }

    /// Adds an ORDER BY item built with [AstBuilder::sort] or
    /// [AstBuilder::sort_pos].
    pub fn order_by(mut self, item: NodeId) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn for_predicate(mut self, pred: NodeId) -> Self {
        self.orderby_for.push(pred);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn ordered(mut self) -> Self {
        self.ordered_hint = true;
        self
    }

    pub fn correlated(mut self, level: u32) -> Self {
        self.correlation_level = level;
        self
    }

    pub fn build(self, b: &mut AstBuilder) -> NodeId {
        let mut spec_ids = Vec::with_capacity(self.specs.len());
        for (i, (spec, join_type, on)) in self.specs.into_iter().enumerate() {
            let location = u32::try_from(i).unwrap_or(u32::MAX) + 1;
            let on_head = b.arena.relink(&on);
            b.arena[spec].location = location;
            if let Some(payload) = b.arena[spec].as_spec_mut() {
                payload.join_type = join_type;
                payload.on_cond = on_head;
            }
            spec_ids.push(spec);
        }

        let group_by = self
            .group_by
            .into_iter()
            .map(|expr| b.sort(expr, true))
            .collect::<Vec<_>>();

        let select = Select {
            list: b.arena.relink(&self.columns),
            from: b.arena.relink(&spec_ids),
            where_clause: b.arena.relink(&self.predicates),
            group_by: b.arena.relink(&group_by),
            having: b.arena.relink(&self.having),
            order_by: b.arena.relink(&self.order_by),
            orderby_for: b.arena.relink(&self.orderby_for),
            distinct: self.distinct,
            ordered_hint: self.ordered_hint,
            correlation_level: self.correlation_level,
        };
        b.arena.alloc(Node::new(NodeKind::Select(Box::new(select))))
    }
}

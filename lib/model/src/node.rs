use crate::arena::NodeId;
use crate::ops::ExprOp;
use crate::types::{DataTypeDescriptor, SqlType};
use crate::value::ValueData;

/// Identity of a FROM-list entry.
///
/// Spec ids are dense, per-statement handles; [Name] nodes refer back to
/// their owning spec through one. They are never arena indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecId(pub u32);

/// A node of the query tree.
///
/// The common header lives here; everything kind-specific sits behind
/// [NodeKind]. `next` links conjuncts of a CNF list, `or_next` disjuncts of
/// a DNF chain. `location` is 0 for top-level WHERE predicates and the
/// owning spec's location for predicates lifted out of an ON clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub next: Option<NodeId>,
    pub or_next: Option<NodeId>,
    pub location: u32,
    pub type_enum: SqlType,
    pub data_type: Option<DataTypeDescriptor>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            next: None,
            or_next: None,
            location: 0,
            type_enum: SqlType::None,
            data_type: None,
        }
    }

    pub fn typed(kind: NodeKind, type_enum: SqlType) -> Self {
        Self {
            type_enum,
            ..Self::new(kind)
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match &self.kind {
            NodeKind::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_select_mut(&mut self) -> Option<&mut Select> {
        match &mut self.kind {
            NodeKind::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_spec(&self) -> Option<&Spec> {
        match &self.kind {
            NodeKind::Spec(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_spec_mut(&mut self) -> Option<&mut Spec> {
        match &mut self.kind {
            NodeKind::Spec(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.kind {
            NodeKind::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_expr_mut(&mut self) -> Option<&mut Expr> {
        match &mut self.kind {
            NodeKind::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match &self.kind {
            NodeKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_sort_spec(&self) -> Option<&SortSpec> {
        match &self.kind {
            NodeKind::SortSpec(sort) => Some(sort),
            _ => None,
        }
    }

    pub fn as_sort_spec_mut(&mut self) -> Option<&mut SortSpec> {
        match &mut self.kind {
            NodeKind::SortSpec(sort) => Some(sort),
            _ => None,
        }
    }

    /// The operator, if this is an Expr node.
    pub fn expr_op(&self) -> Option<ExprOp> {
        self.as_expr().map(|e| e.op)
    }

    /// Whether this node is a query-producing statement.
    pub fn is_query(&self) -> bool {
        matches!(self.kind, NodeKind::Select(_) | NodeKind::SetOp(_))
    }

    /// Whether this node is the literal boolean `b`.
    pub fn is_bool_literal(&self, b: bool) -> bool {
        matches!(&self.kind, NodeKind::Value(v) if v.data == ValueData::Bool(b))
    }
}

/// The closed set of node kinds.
///
/// Union, Difference and Intersection share the [SetOp] payload; the
/// operator field keeps the three kinds distinguishable.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Select(Box<Select>),
    SetOp(Box<SetOp>),
    Update(Box<Update>),
    Delete(Box<Delete>),
    Insert(Box<Insert>),
    Spec(Box<Spec>),
    Name(Name),
    Value(Value),
    HostVar(HostVar),
    Expr(Expr),
    Function(Box<FunctionCall>),
    Dot(Dot),
    SortSpec(SortSpec),
}

/// A SELECT statement or subquery.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Select {
    /// Select list, `next`-chained.
    pub list: Option<NodeId>,
    /// FROM list of [Spec] nodes, `next`-chained.
    pub from: Option<NodeId>,
    /// WHERE as a CNF conjunct list.
    pub where_clause: Option<NodeId>,
    /// GROUP BY items, [SortSpec] nodes.
    pub group_by: Option<NodeId>,
    /// HAVING as a CNF conjunct list.
    pub having: Option<NodeId>,
    /// ORDER BY items, [SortSpec] nodes.
    pub order_by: Option<NodeId>,
    /// Predicates of an `ORDER BY ... FOR` clause.
    pub orderby_for: Option<NodeId>,
    pub distinct: bool,
    /// An ORDERED join hint pins the written join order.
    pub ordered_hint: bool,
    /// 0 when the (sub)query references no outer specs.
    pub correlation_level: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Difference,
    Intersection,
}

/// A set-operation statement over two query arms.
#[derive(Clone, Debug, PartialEq)]
pub struct SetOp {
    pub op: SetOpKind,
    pub left: NodeId,
    pub right: NodeId,
    pub all: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub spec: NodeId,
    /// Assignment expressions, `next`-chained `attr = expr` nodes.
    pub assignments: Option<NodeId>,
    pub where_clause: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delete {
    pub spec: NodeId,
    pub where_clause: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
    /// VALUES rows, `next`-chained.
    Values(Option<NodeId>),
    /// INSERT ... SELECT.
    Query(NodeId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    pub spec: NodeId,
    /// Target attributes, `next`-chained [Name] nodes.
    pub attr_list: Option<NodeId>,
    pub source: InsertSource,
}

/// What a FROM-list entry ranges over.
#[derive(Clone, Debug, PartialEq)]
pub enum SpecSource {
    /// A named class (table or view).
    Class(String),
    /// A derived table whose body is a query node.
    Derived(NodeId),
    /// A derived table over a set expression, `TABLE({...})`.
    SetExpr(NodeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    /// Freely reorderable by the planner.
    None,
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::LeftOuter | JoinType::RightOuter)
    }
}

/// Classification of a path-expression spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecMetaClass {
    Regular,
    PathInner,
    PathOuter,
    /// An outer path that could not be proven equivalent to an inner path
    /// under NULL substitution.
    PathOuterWeasel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivedTableType {
    Subquery,
    /// `TABLE({...})` over a set expression.
    Table,
}

/// A FROM-list entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Spec {
    pub id: SpecId,
    pub source: SpecSource,
    /// Range variable (alias). Empty when the class name doubles as one.
    pub range_var: String,
    /// Column names exposed by a derived table.
    pub as_attr_list: Vec<String>,
    pub join_type: JoinType,
    /// ON condition; lifted into WHERE during rewrite and restored at the
    /// end through the location tags.
    pub on_cond: Option<NodeId>,
    /// Sub-specs of an object path expression.
    pub path_entities: Vec<NodeId>,
    /// The synthetic `derived_oid = parent.oid` conjunct gluing a path spec
    /// to its parent; at most one conjunct, typed OBJECT.
    pub path_conjuncts: Option<NodeId>,
    pub meta_class: SpecMetaClass,
    pub derived_table_type: Option<DerivedTableType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameMetaClass {
    Normal,
    /// The OID pseudo-attribute of a class.
    OidAttr,
    Class,
    Shared,
    Parameter,
}

/// A resolved attribute reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Name {
    /// Attribute name as written.
    pub original: String,
    /// Alias of the qualifying spec.
    pub resolved: String,
    pub spec_id: SpecId,
    pub meta_class: NameMetaClass,
}

impl Name {
    /// Whether this references the same attribute as `other`.
    pub fn same_attribute(&self, other: &Name) -> bool {
        self.spec_id == other.spec_id && self.original == other.original
    }
}

/// A literal constant. The value domain lives in the node header.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub data: ValueData,
}

/// A host-variable placeholder with its position in the caller's vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostVar {
    pub index: u32,
}

/// Rewrite bookkeeping bits on an Expr node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExprFlags {
    /// Produced by equality-term propagation from a join edge; the original
    /// predicate is still present.
    pub transitive: bool,
    /// An internal copy whose original is still present; dropped when ON
    /// conditions are restored.
    pub copy_push: bool,
    /// The RANGE disjunction simplified away entirely.
    pub empty_range: bool,
    /// The RANGE covers the whole domain; exempt from strengthening and
    /// auto-parameterization.
    pub full_range: bool,
    /// Contains ORDERBY_NUM and is pinned to its clause.
    pub orderby_num: bool,
}

/// An operator application.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub op: ExprOp,
    pub arg1: Option<NodeId>,
    pub arg2: Option<NodeId>,
    pub arg3: Option<NodeId>,
    /// Target descriptor of a CAST.
    pub cast_type: Option<DataTypeDescriptor>,
    pub flags: ExprFlags,
}

impl Expr {
    pub fn unary(op: ExprOp, arg1: NodeId) -> Self {
        Self {
            op,
            arg1: Some(arg1),
            arg2: None,
            arg3: None,
            cast_type: None,
            flags: ExprFlags::default(),
        }
    }

    pub fn binary(op: ExprOp, arg1: NodeId, arg2: NodeId) -> Self {
        Self {
            arg2: Some(arg2),
            ..Self::unary(op, arg1)
        }
    }

    pub fn ternary(op: ExprOp, arg1: NodeId, arg2: NodeId, arg3: NodeId) -> Self {
        Self {
            arg3: Some(arg3),
            ..Self::binary(op, arg1, arg2)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    CountStar,
    Generic(String),
}

impl FunctionKind {
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, FunctionKind::Generic(_))
    }
}

/// A function call with `next`-chained arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub kind: FunctionKind,
    pub args: Option<NodeId>,
}

/// A path step, `arg1.arg2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dot {
    pub arg1: NodeId,
    pub arg2: NodeId,
}

/// One ORDER BY or GROUP BY item.
#[derive(Clone, Debug, PartialEq)]
pub struct SortSpec {
    pub expr: NodeId,
    pub asc: bool,
    /// Select-list position for positional items (`ORDER BY 2`).
    pub pos: Option<u32>,
}

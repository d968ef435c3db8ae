//! SQL rendering of node trees.
//!
//! The renderer is deterministic and total: every node kind prints, even
//! mid-rewrite forms like RANGE chains and lifted ON conditions. Snapshot
//! tests and error snippets both go through here.

use crate::arena::{NodeArena, NodeId};
use crate::node::{FunctionKind, JoinType, NodeKind, SetOpKind, Spec, SpecSource};
use crate::ops::{BetweenVariant, ExprOp};
use crate::types::SqlType;
use crate::value::ValueData;
use std::fmt;
use std::fmt::{Display, Formatter, Write};

impl NodeArena {
    /// A lazily rendered SQL view of the subtree at `id`.
    pub fn display(&self, id: NodeId) -> SqlDisplay<'_> {
        SqlDisplay { arena: self, id }
    }

    /// Renders the subtree at `id` to a string.
    pub fn sql(&self, id: NodeId) -> String {
        self.display(id).to_string()
    }
}

pub struct SqlDisplay<'a> {
    arena: &'a NodeArena,
    id: NodeId,
}

impl Display for SqlDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let printer = Printer { arena: self.arena };
        printer.node(&mut out, self.id)?;
        f.write_str(&out)
    }
}

struct Printer<'a> {
    arena: &'a NodeArena,
}

impl Printer<'_> {
    fn node(&self, out: &mut String, id: NodeId) -> fmt::Result {
        let node = self.arena.node(id);
        match &node.kind {
            NodeKind::Select(select) => {
                out.push_str("SELECT ");
                if select.distinct {
                    out.push_str("DISTINCT ");
                }
                self.comma_list(out, select.list)?;
                if select.from.is_some() {
                    out.push_str(" FROM ");
                    self.from_list(out, select.from)?;
                }
                if select.where_clause.is_some() {
                    out.push_str(" WHERE ");
                    self.conjuncts(out, select.where_clause)?;
                }
                if select.group_by.is_some() {
                    out.push_str(" GROUP BY ");
                    self.comma_list(out, select.group_by)?;
                }
                if select.having.is_some() {
                    out.push_str(" HAVING ");
                    self.conjuncts(out, select.having)?;
                }
                if select.order_by.is_some() {
                    out.push_str(" ORDER BY ");
                    self.comma_list(out, select.order_by)?;
                }
                if select.orderby_for.is_some() {
                    out.push_str(" FOR ");
                    self.conjuncts(out, select.orderby_for)?;
                }
                Ok(())
            }
            NodeKind::SetOp(set_op) => {
                out.push('(');
                self.node(out, set_op.left)?;
                out.push_str(") ");
                out.push_str(match set_op.op {
                    SetOpKind::Union => "UNION",
                    SetOpKind::Difference => "DIFFERENCE",
                    SetOpKind::Intersection => "INTERSECTION",
                });
                if set_op.all {
                    out.push_str(" ALL");
                }
                out.push_str(" (");
                self.node(out, set_op.right)?;
                out.push(')');
                Ok(())
            }
            NodeKind::Update(update) => {
                out.push_str("UPDATE ");
                self.node(out, update.spec)?;
                out.push_str(" SET ");
                self.comma_list(out, update.assignments)?;
                if update.where_clause.is_some() {
                    out.push_str(" WHERE ");
                    self.conjuncts(out, update.where_clause)?;
                }
                Ok(())
            }
            NodeKind::Delete(delete) => {
                out.push_str("DELETE FROM ");
                self.node(out, delete.spec)?;
                if delete.where_clause.is_some() {
                    out.push_str(" WHERE ");
                    self.conjuncts(out, delete.where_clause)?;
                }
                Ok(())
            }
            NodeKind::Insert(insert) => {
                out.push_str("INSERT INTO ");
                self.node(out, insert.spec)?;
                if insert.attr_list.is_some() {
                    out.push_str(" (");
                    self.comma_list(out, insert.attr_list)?;
                    out.push(')');
                }
                match &insert.source {
                    crate::node::InsertSource::Values(values) => {
                        out.push_str(" VALUES (");
                        self.comma_list(out, *values)?;
                        out.push(')');
                    }
                    crate::node::InsertSource::Query(query) => {
                        out.push(' ');
                        self.node(out, *query)?;
                    }
                }
                Ok(())
            }
            NodeKind::Spec(spec) => self.spec_body(out, spec),
            NodeKind::Name(name) => {
                if name.resolved.is_empty() {
                    out.push_str(&name.original);
                } else {
                    write!(out, "{}.{}", name.resolved, name.original)?;
                }
                Ok(())
            }
            NodeKind::Value(value) => self.value(out, &value.data),
            NodeKind::HostVar(hv) => write!(out, "?:{}", hv.index),
            NodeKind::Expr(_) => self.expr(out, id),
            NodeKind::Function(function) => {
                match &function.kind {
                    FunctionKind::Min => out.push_str("MIN"),
                    FunctionKind::Max => out.push_str("MAX"),
                    FunctionKind::Sum => out.push_str("SUM"),
                    FunctionKind::Avg => out.push_str("AVG"),
                    FunctionKind::Count => out.push_str("COUNT"),
                    FunctionKind::CountStar => {
                        out.push_str("COUNT(*)");
                        return Ok(());
                    }
                    FunctionKind::Generic(name) => out.push_str(name),
                }
                out.push('(');
                self.comma_list(out, function.args)?;
                out.push(')');
                Ok(())
            }
            NodeKind::Dot(dot) => {
                self.node(out, dot.arg1)?;
                out.push('.');
                // The trailing step prints unqualified.
                match &self.arena.node(dot.arg2).kind {
                    NodeKind::Name(name) => out.push_str(&name.original),
                    _ => self.node(out, dot.arg2)?,
                }
                Ok(())
            }
            NodeKind::SortSpec(sort) => {
                match sort.pos {
                    Some(pos) => write!(out, "{pos}")?,
                    None => self.node(out, sort.expr)?,
                }
                if !sort.asc {
                    out.push_str(" DESC");
                }
                Ok(())
            }
        }
    }

    fn spec_body(&self, out: &mut String, spec: &Spec) -> fmt::Result {
        match &spec.source {
            SpecSource::Class(name) => {
                out.push_str(name);
                if !spec.range_var.is_empty() && spec.range_var != *name {
                    write!(out, " {}", spec.range_var)?;
                }
            }
            SpecSource::Derived(query) => {
                out.push('(');
                self.node(out, *query)?;
                out.push(')');
                if !spec.range_var.is_empty() {
                    write!(out, " {}", spec.range_var)?;
                }
                self.attr_list(out, spec)?;
            }
            SpecSource::SetExpr(set) => {
                out.push_str("TABLE(");
                self.node(out, *set)?;
                out.push(')');
                if !spec.range_var.is_empty() {
                    write!(out, " {}", spec.range_var)?;
                }
                self.attr_list(out, spec)?;
            }
        }
        Ok(())
    }

    fn attr_list(&self, out: &mut String, spec: &Spec) -> fmt::Result {
        if !spec.as_attr_list.is_empty() {
            write!(out, " ({})", spec.as_attr_list.join(", "))?;
        }
        Ok(())
    }

    fn from_list(&self, out: &mut String, head: Option<NodeId>) -> fmt::Result {
        for (i, id) in self.arena.list(head).into_iter().enumerate() {
            let node = self.arena.node(id);
            let Some(spec) = node.as_spec() else {
                continue;
            };
            if i > 0 {
                match spec.join_type {
                    JoinType::None => out.push_str(", "),
                    JoinType::Inner => out.push_str(" INNER JOIN "),
                    JoinType::LeftOuter => out.push_str(" LEFT OUTER JOIN "),
                    JoinType::RightOuter => out.push_str(" RIGHT OUTER JOIN "),
                }
            }
            self.spec_body(out, spec)?;
            if i > 0 && spec.on_cond.is_some() {
                out.push_str(" ON ");
                self.conjuncts(out, spec.on_cond)?;
            }
        }
        Ok(())
    }

    fn comma_list(&self, out: &mut String, head: Option<NodeId>) -> fmt::Result {
        for (i, id) in self.arena.list(head).into_iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.node(out, id)?;
        }
        Ok(())
    }

    /// CNF conjunct list: `AND`-joined, each disjunction parenthesized when
    /// it has more than one element.
    fn conjuncts(&self, out: &mut String, head: Option<NodeId>) -> fmt::Result {
        for (i, id) in self.arena.list(head).into_iter().enumerate() {
            if i > 0 {
                out.push_str(" AND ");
            }
            let or_chain = self.arena.or_list(Some(id));
            if or_chain.len() > 1 {
                out.push('(');
                for (j, or_id) in or_chain.into_iter().enumerate() {
                    if j > 0 {
                        out.push_str(" OR ");
                    }
                    self.node(out, or_id)?;
                }
                out.push(')');
            } else {
                self.node(out, id)?;
            }
        }
        Ok(())
    }

    fn value(&self, out: &mut String, data: &ValueData) -> fmt::Result {
        match data {
            ValueData::Null => out.push_str("NULL"),
            ValueData::Bool(true) => out.push_str("TRUE"),
            ValueData::Bool(false) => out.push_str("FALSE"),
            ValueData::Int(v) => write!(out, "{v}")?,
            ValueData::Double(v) => write!(out, "{v}")?,
            ValueData::Str(s) => write!(out, "'{}'", s.replace('\'', "''"))?,
            ValueData::Set(elements) => {
                out.push('{');
                for (i, &e) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.node(out, e)?;
                }
                out.push('}');
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines, reason = "one arm per operator")]
    fn expr(&self, out: &mut String, id: NodeId) -> fmt::Result {
        let node = self.arena.node(id);
        let Some(expr) = node.as_expr() else {
            return self.node(out, id);
        };
        match expr.op {
            ExprOp::And | ExprOp::Or => {
                self.bool_operand(out, expr.arg1)?;
                write!(out, " {} ", expr.op)?;
                self.bool_operand(out, expr.arg2)?;
            }
            ExprOp::Not => {
                out.push_str("NOT (");
                self.opt(out, expr.arg1)?;
                out.push(')');
            }
            ExprOp::Eq | ExprOp::Ne | ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge => {
                self.opt(out, expr.arg1)?;
                write!(out, " {} ", expr.op)?;
                self.query_operand(out, expr.arg2)?;
            }
            ExprOp::IsNull | ExprOp::IsNotNull => {
                self.opt(out, expr.arg1)?;
                write!(out, " {}", expr.op)?;
            }
            ExprOp::Like => {
                self.opt(out, expr.arg1)?;
                out.push_str(" LIKE ");
                self.opt(out, expr.arg2)?;
            }
            ExprOp::Between(variant) => {
                self.opt(out, expr.arg1)?;
                out.push_str(" BETWEEN ");
                match variant {
                    BetweenVariant::And => {
                        self.opt(out, expr.arg2)?;
                        out.push_str(" AND ");
                        self.opt(out, expr.arg3)?;
                    }
                    _ => self.bounds(out, variant, expr.arg2, expr.arg3)?,
                }
            }
            ExprOp::RangeSpec(variant) => match variant {
                BetweenVariant::EqNa => {
                    out.push_str("= ");
                    self.opt(out, expr.arg1)?;
                }
                _ => self.bounds(out, variant, expr.arg1, expr.arg2)?,
            },
            ExprOp::Range => {
                self.opt(out, expr.arg1)?;
                out.push_str(" RANGE(");
                for (i, spec) in self.arena.or_list(expr.arg2).into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.node(out, spec)?;
                }
                out.push(')');
            }
            ExprOp::In => {
                self.opt(out, expr.arg1)?;
                out.push_str(" IN ");
                self.query_operand(out, expr.arg2)?;
            }
            ExprOp::LtSome | ExprOp::LeSome | ExprOp::GtSome | ExprOp::GeSome => {
                self.opt(out, expr.arg1)?;
                write!(out, " {} ", expr.op)?;
                self.query_operand(out, expr.arg2)?;
            }
            ExprOp::Plus | ExprOp::Minus | ExprOp::Times | ExprOp::Divide => {
                self.arith_operand(out, expr.arg1)?;
                write!(out, " {} ", expr.op)?;
                self.arith_operand(out, expr.arg2)?;
            }
            ExprOp::UnaryMinus => {
                out.push('-');
                self.arith_operand(out, expr.arg1)?;
            }
            ExprOp::Cast => {
                out.push_str("CAST(");
                self.opt(out, expr.arg1)?;
                out.push_str(" AS ");
                self.type_name(out, node.type_enum, expr.cast_type.as_ref())?;
                out.push(')');
            }
            ExprOp::InstNum | ExprOp::OrderbyNum | ExprOp::GroupbyNum => {
                write!(out, "{}", expr.op)?;
            }
        }
        Ok(())
    }

    /// Prints the bounds of a non-AND between variant, omitting infinite
    /// sides: `15 GT_LE 20`, `15 GE_INF`, `INF_LE 20`.
    fn bounds(
        &self,
        out: &mut String,
        variant: BetweenVariant,
        lower: Option<NodeId>,
        upper: Option<NodeId>,
    ) -> fmt::Result {
        if variant.has_lower() {
            self.opt(out, lower)?;
            out.push(' ');
        }
        write!(out, "{variant}")?;
        if variant.has_upper() {
            out.push(' ');
            self.opt(out, upper)?;
        }
        Ok(())
    }

    fn type_name(
        &self,
        out: &mut String,
        type_enum: SqlType,
        descriptor: Option<&crate::types::DataTypeDescriptor>,
    ) -> fmt::Result {
        write!(out, "{type_enum}")?;
        if let Some(descriptor) = descriptor {
            match (descriptor.precision, descriptor.scale) {
                (Some(p), Some(s)) => write!(out, "({p},{s})")?,
                (Some(p), None) => write!(out, "({p})")?,
                _ => {}
            }
        }
        Ok(())
    }

    fn opt(&self, out: &mut String, id: Option<NodeId>) -> fmt::Result {
        match id {
            Some(id) => self.node(out, id),
            None => Ok(()),
        }
    }

    /// Parenthesizes AND/OR children so precedence stays readable.
    fn bool_operand(&self, out: &mut String, id: Option<NodeId>) -> fmt::Result {
        let Some(id) = id else {
            return Ok(());
        };
        let wrap = matches!(
            self.arena.node(id).expr_op(),
            Some(ExprOp::And | ExprOp::Or)
        );
        if wrap {
            out.push('(');
            self.node(out, id)?;
            out.push(')');
        } else {
            self.node(out, id)?;
        }
        Ok(())
    }

    /// Parenthesizes nested arithmetic.
    fn arith_operand(&self, out: &mut String, id: Option<NodeId>) -> fmt::Result {
        let Some(id) = id else {
            return Ok(());
        };
        let wrap = matches!(
            self.arena.node(id).expr_op(),
            Some(ExprOp::Plus | ExprOp::Minus | ExprOp::Times | ExprOp::Divide)
        );
        if wrap {
            out.push('(');
            self.node(out, id)?;
            out.push(')');
        } else {
            self.node(out, id)?;
        }
        Ok(())
    }

    /// Parenthesizes subquery operands.
    fn query_operand(&self, out: &mut String, id: Option<NodeId>) -> fmt::Result {
        let Some(id) = id else {
            return Ok(());
        };
        if self.arena.node(id).is_query() {
            out.push('(');
            self.node(out, id)?;
            out.push(')');
        } else {
            self.node(out, id)?;
        }
        Ok(())
    }
}

use std::fmt;
use std::fmt::{Display, Formatter};

/// Openness variant of a between pair.
///
/// `And` is the parse-time form of `BETWEEN lo AND hi`; all other variants
/// are produced by the rewriter. The `Inf` variants describe half-open
/// intervals and `EqNa` a single point (the second bound is not applicable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BetweenVariant {
    And,
    EqNa,
    GeLe,
    GeLt,
    GtLe,
    GtLt,
    GeInf,
    GtInf,
    InfLe,
    InfLt,
}

impl BetweenVariant {
    /// Whether the lower bound exists and excludes its endpoint.
    pub fn lower_open(self) -> bool {
        matches!(
            self,
            BetweenVariant::GtLe | BetweenVariant::GtLt | BetweenVariant::GtInf
        )
    }

    /// Whether the upper bound exists and excludes its endpoint.
    pub fn upper_open(self) -> bool {
        matches!(
            self,
            BetweenVariant::GeLt | BetweenVariant::GtLt | BetweenVariant::InfLt
        )
    }

    pub fn has_lower(self) -> bool {
        !matches!(self, BetweenVariant::InfLe | BetweenVariant::InfLt)
    }

    pub fn has_upper(self) -> bool {
        !matches!(self, BetweenVariant::GeInf | BetweenVariant::GtInf)
    }

    /// Builds the variant for the given bound shape. `None` on a side means
    /// that side is unbounded; `Some(true)` a strict bound.
    pub fn from_bounds(lower_strict: Option<bool>, upper_strict: Option<bool>) -> Option<Self> {
        let variant = match (lower_strict, upper_strict) {
            (Some(false), Some(false)) => BetweenVariant::GeLe,
            (Some(false), Some(true)) => BetweenVariant::GeLt,
            (Some(true), Some(false)) => BetweenVariant::GtLe,
            (Some(true), Some(true)) => BetweenVariant::GtLt,
            (Some(false), None) => BetweenVariant::GeInf,
            (Some(true), None) => BetweenVariant::GtInf,
            (None, Some(false)) => BetweenVariant::InfLe,
            (None, Some(true)) => BetweenVariant::InfLt,
            (None, None) => return None,
        };
        Some(variant)
    }
}

impl Display for BetweenVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetweenVariant::And => "AND",
            BetweenVariant::EqNa => "EQ_NA",
            BetweenVariant::GeLe => "GE_LE",
            BetweenVariant::GeLt => "GE_LT",
            BetweenVariant::GtLe => "GT_LE",
            BetweenVariant::GtLt => "GT_LT",
            BetweenVariant::GeInf => "GE_INF",
            BetweenVariant::GtInf => "GT_INF",
            BetweenVariant::InfLe => "INF_LE",
            BetweenVariant::InfLt => "INF_LT",
        };
        write!(f, "{name}")
    }
}

/// Operator of an [Expr](crate::node::Expr) node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExprOp {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    Like,
    /// `arg1 BETWEEN arg2 .. arg3`, openness given by the variant.
    Between(BetweenVariant),
    /// One element of a RANGE disjunction chain; `arg1`/`arg2` are the bounds.
    RangeSpec(BetweenVariant),
    /// `arg1 RANGE (...)` with the disjunction chain in `arg2`.
    Range,
    /// `arg1 IN arg2` where `arg2` is a set literal or a subquery.
    In,
    LtSome,
    LeSome,
    GtSome,
    GeSome,
    Plus,
    Minus,
    Times,
    Divide,
    UnaryMinus,
    Cast,
    InstNum,
    OrderbyNum,
    GroupbyNum,
}

impl ExprOp {
    /// The six ordinary comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            ExprOp::Eq | ExprOp::Ne | ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge
        )
    }

    /// Comparisons that bound their left operand from one side.
    pub fn is_rangeable(self) -> bool {
        matches!(self, ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge)
    }

    pub fn is_quantified_some(self) -> bool {
        matches!(
            self,
            ExprOp::LtSome | ExprOp::LeSome | ExprOp::GtSome | ExprOp::GeSome
        )
    }

    /// The operator obtained by swapping the operands, e.g. `<` becomes `>`.
    pub fn mirrored(self) -> Option<ExprOp> {
        match self {
            ExprOp::Eq => Some(ExprOp::Eq),
            ExprOp::Ne => Some(ExprOp::Ne),
            ExprOp::Lt => Some(ExprOp::Gt),
            ExprOp::Le => Some(ExprOp::Ge),
            ExprOp::Gt => Some(ExprOp::Lt),
            ExprOp::Ge => Some(ExprOp::Le),
            _ => None,
        }
    }

    /// The operator equivalent to `NOT (a self b)`, used by negation pushdown.
    pub fn complement(self) -> Option<ExprOp> {
        match self {
            ExprOp::Eq => Some(ExprOp::Ne),
            ExprOp::Ne => Some(ExprOp::Eq),
            ExprOp::Lt => Some(ExprOp::Ge),
            ExprOp::Le => Some(ExprOp::Gt),
            ExprOp::Gt => Some(ExprOp::Le),
            ExprOp::Ge => Some(ExprOp::Lt),
            ExprOp::IsNull => Some(ExprOp::IsNotNull),
            ExprOp::IsNotNull => Some(ExprOp::IsNull),
            _ => None,
        }
    }

    /// Whether a NULL operand makes the predicate non-true.
    ///
    /// Such predicates kill NULL-extended rows, which drives outer-to-inner
    /// join strengthening.
    pub fn is_null_rejecting(self) -> bool {
        self.is_comparison()
            || matches!(
                self,
                ExprOp::Like
                    | ExprOp::Between(_)
                    | ExprOp::Range
                    | ExprOp::In
                    | ExprOp::IsNotNull
            )
            || self.is_quantified_some()
    }

    /// Predicates pinned to a row-numbering function; these never move
    /// between clauses.
    pub fn is_row_numbering(self) -> bool {
        matches!(
            self,
            ExprOp::InstNum | ExprOp::OrderbyNum | ExprOp::GroupbyNum
        )
    }

    /// The base comparison of a quantified-SOME operator.
    pub fn some_base(self) -> Option<ExprOp> {
        match self {
            ExprOp::LtSome => Some(ExprOp::Lt),
            ExprOp::LeSome => Some(ExprOp::Le),
            ExprOp::GtSome => Some(ExprOp::Gt),
            ExprOp::GeSome => Some(ExprOp::Ge),
            _ => None,
        }
    }
}

impl Display for ExprOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExprOp::And => "AND",
            ExprOp::Or => "OR",
            ExprOp::Not => "NOT",
            ExprOp::Eq => "=",
            ExprOp::Ne => "<>",
            ExprOp::Lt => "<",
            ExprOp::Le => "<=",
            ExprOp::Gt => ">",
            ExprOp::Ge => ">=",
            ExprOp::IsNull => "IS NULL",
            ExprOp::IsNotNull => "IS NOT NULL",
            ExprOp::Like => "LIKE",
            ExprOp::Between(_) => "BETWEEN",
            ExprOp::RangeSpec(_) => "RANGE_SPEC",
            ExprOp::Range => "RANGE",
            ExprOp::In => "IN",
            ExprOp::LtSome => "< SOME",
            ExprOp::LeSome => "<= SOME",
            ExprOp::GtSome => "> SOME",
            ExprOp::GeSome => ">= SOME",
            ExprOp::Plus => "+",
            ExprOp::Minus => "-",
            ExprOp::Times => "*",
            ExprOp::Divide => "/",
            ExprOp::UnaryMinus => "-",
            ExprOp::Cast => "CAST",
            ExprOp::InstNum => "INST_NUM()",
            ExprOp::OrderbyNum => "ORDERBY_NUM()",
            ExprOp::GroupbyNum => "GROUPBY_NUM()",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_is_involutive_on_comparisons() {
        for op in [ExprOp::Eq, ExprOp::Ne, ExprOp::Lt, ExprOp::Le, ExprOp::Gt, ExprOp::Ge] {
            let mirrored = op.mirrored().unwrap();
            assert_eq!(mirrored.mirrored().unwrap(), op);
        }
    }

    #[test]
    fn complement_round_trips() {
        assert_eq!(ExprOp::Lt.complement(), Some(ExprOp::Ge));
        assert_eq!(ExprOp::Ge.complement(), Some(ExprOp::Lt));
        assert_eq!(ExprOp::IsNull.complement(), Some(ExprOp::IsNotNull));
        assert_eq!(ExprOp::Like.complement(), None);
    }

    #[test]
    fn variant_from_bounds() {
        assert_eq!(
            BetweenVariant::from_bounds(Some(true), Some(false)),
            Some(BetweenVariant::GtLe)
        );
        assert_eq!(
            BetweenVariant::from_bounds(None, Some(true)),
            Some(BetweenVariant::InfLt)
        );
        assert_eq!(BetweenVariant::from_bounds(None, None), None);
    }
}

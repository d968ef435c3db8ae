//! Requel rewrites parsed, type-checked SQL statements into equivalent
//! but better-structured trees for a cost-based join planner.
//!
//! The heavy lifting lives in the member crates; this crate re-exports
//! the public surface and the single entry point.
//!
//! ```
//! use requel::{rewrite, AstBuilder, EmptySchema, RewriteContext};
//!
//! let mut b = AstBuilder::new();
//! let t = b.class_spec("t", "t");
//! let a_col = b.name(t, "a");
//! let a = b.name(t, "a");
//! let ten = b.int(10);
//! let p1 = b.ge(a, ten);
//! let a = b.name(t, "a");
//! let twenty = b.int(20);
//! let p2 = b.le(a, twenty);
//! let select = b
//!     .select()
//!     .column(a_col)
//!     .from(t)
//!     .predicate(p1)
//!     .predicate(p2)
//!     .build(&mut b);
//!
//! let mut arena = b.into_arena();
//! let mut host_vars = Vec::new();
//! let mut ctx = RewriteContext::new(&mut arena, &EmptySchema, &mut host_vars, select);
//! let root = rewrite(&mut ctx, select).unwrap();
//! assert_eq!(arena.sql(root), "SELECT t.a FROM t WHERE t.a RANGE(10 GE_LE 20)");
//! ```

pub use requel_common::{
    ClassHandle, Domain, EmptySchema, MemorySchema, RewriteError, RewriteResult, SchemaProvider,
    Transformed,
};
pub use requel_model::{
    AstBuilder, BetweenVariant, DataTypeDescriptor, ExprOp, JoinType, NodeArena, NodeId,
    SelectBuilder, SpecId, SqlType, ValueData,
};
pub use requel_rewrite::{rewrite, RewriteContext, RewritePass, Rewriter, RewriterOptions};

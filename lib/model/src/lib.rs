//! Requel data model.
//!
//! This crate defines the typed query tree the rewriter operates on: an
//! arena of heterogeneous nodes with a common header (`next`/`or_next`
//! chain links, clause `location`, SQL type) and kind-specific payloads.
//! It also provides structural traversal, in-place substitution, SQL
//! rendering, and a fluent builder for constructing trees programmatically.

mod arena;
mod builder;
mod display;
mod node;
mod ops;
mod types;
mod value;
pub mod visit;

pub use arena::{ArenaFull, NodeArena, NodeId};
pub use builder::{AstBuilder, SelectBuilder};
pub use display::SqlDisplay;
pub use node::{
    Delete, Dot, Expr, ExprFlags, FunctionCall, FunctionKind, HostVar, Insert, InsertSource,
    JoinType, Name, NameMetaClass, Node, NodeKind, Select, SetOp, SetOpKind, SortSpec, Spec,
    SpecId, SpecMetaClass, SpecSource, Update, Value,
};
pub use node::DerivedTableType;
pub use ops::{BetweenVariant, ExprOp};
pub use types::{DataTypeDescriptor, SqlType};
pub use value::ValueData;

//! Shared substrate of the requel workspace: the error and result types,
//! the [Transformed] change-tracking wrapper, and the read-only schema
//! interface the rewriter consults.

pub mod error;
mod schema;
mod transformed;

pub use error::{RewriteError, RewriteResult};
pub use schema::{ClassHandle, Domain, EmptySchema, MemorySchema, SchemaProvider};
pub use transformed::Transformed;

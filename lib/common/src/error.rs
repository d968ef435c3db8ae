use requel_model::ArenaFull;

/// An error surfaced by the rewriter.
///
/// Only resource failures and semantic conflicts surface; an unprovable
/// rewrite condition is never an error, it is a silently declined rewrite
/// expressed as an unchanged tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RewriteError {
    /// Arena or host-variable storage exhausted; the input tree is
    /// returned unchanged in meaning.
    #[error("out of memory while rewriting query")]
    OutOfMemory,
    /// The same sort column was requested with conflicting directions.
    #[error("conflicting sort directions for '{column}'")]
    SortDirectionConflict { column: String },
    /// An outer-join condition references specs it may not see.
    #[error("misplaced outer join condition: {snippet}")]
    OuterJoinMisplacement { snippet: String },
}

impl From<ArenaFull> for RewriteError {
    fn from(_: ArenaFull) -> Self {
        RewriteError::OutOfMemory
    }
}

/// Result alias used across the rewriter crates.
pub type RewriteResult<T> = Result<T, RewriteError>;

//! The join structuralizer: path-join classification and ON-clause
//! lifting. Restoration of ON conditions runs at the very end of the
//! pipeline, after post-processing may have demoted joins.

mod classify;
mod on_clause;

pub(crate) use on_clause::{restore_on_conditions, set_location_deep};

use crate::{RewriteContext, RewritePass};
use requel_common::{RewriteResult, Transformed};
use requel_model::NodeId;

/// Classifies path specs and lifts ON conditions into WHERE with tagged
/// locations. This pass never fails a query: classification only becomes
/// strictly more specific, and lifting preserves semantics by location.
#[derive(Debug, Default)]
pub struct JoinStructuralizer;

impl RewritePass for JoinStructuralizer {
    fn name(&self) -> &str {
        "join-structuralizer"
    }

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>> {
        let classified = classify::classify_paths(ctx, stmt)?;
        let lifted = on_clause::lift_on_conditions(ctx, stmt)?;
        Ok(classified.and(lifted))
    }
}

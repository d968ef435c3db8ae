//! Post-processing: join strengthening and unordering, ORDER BY
//! reduction, optional auto-parameterization, and the final ON-clause
//! restoration.

mod auto_param;
mod order_by;
mod strengthen;
mod unorder;

use crate::{join, RewriteContext, RewritePass, RewriterOptions};
use requel_common::{RewriteResult, Transformed};
use requel_model::NodeId;

#[derive(Debug, Default)]
pub struct PostProcessor {
    options: RewriterOptions,
}

impl PostProcessor {
    pub fn new(options: RewriterOptions) -> Self {
        Self { options }
    }
}

impl RewritePass for PostProcessor {
    fn name(&self) -> &str {
        "post-processor"
    }

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>> {
        let mut changed = false;
        changed |= strengthen::strengthen_outer_joins(ctx, stmt)?.transformed;
        changed |= unorder::unorder_inner_joins(ctx, stmt)?.transformed;
        changed |= order_by::reduce_order_by(ctx, stmt)?.transformed;
        if self.options.auto_parameterize {
            changed |= auto_param::auto_parameterize(ctx, stmt)?.transformed;
        }
        changed |= join::restore_on_conditions(ctx, stmt)?.transformed;
        Ok(Transformed::new((), changed))
    }
}

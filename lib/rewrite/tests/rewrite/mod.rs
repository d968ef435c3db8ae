//! End-to-end rewriter tests: the seed scenarios plus the structural
//! properties (CNF form, idempotence, location round-trip).

mod properties;
mod scenarios;

use requel_common::EmptySchema;
use requel_model::{AstBuilder, NodeArena, NodeId, ValueData};
use requel_rewrite::{RewriteContext, Rewriter, RewriterOptions};

/// Runs the rewriter with default options and renders the result.
pub fn rewrite_sql(builder: AstBuilder, root: NodeId) -> String {
    let mut arena = builder.into_arena();
    let root = rewrite_in(&mut arena, root, RewriterOptions::default()).0;
    arena.sql(root)
}

/// Runs the rewriter in an existing arena, returning the root and the
/// host-variable vector.
pub fn rewrite_in(
    arena: &mut NodeArena,
    root: NodeId,
    options: RewriterOptions,
) -> (NodeId, Vec<ValueData>) {
    let mut host_vars = Vec::new();
    let mut ctx = RewriteContext::new(arena, &EmptySchema, &mut host_vars, root);
    let root = Rewriter::new(options).rewrite(&mut ctx, root).unwrap();
    (root, host_vars)
}

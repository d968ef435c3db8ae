//! The requel query rewriter.
//!
//! A tree-to-tree transformer that takes a parsed, type-checked statement
//! and produces an equivalent but better-structured one for the join
//! planner: path joins classified, ON conditions lifted and restored
//! through location tags, predicates in CNF, equality terms propagated,
//! comparisons collapsed into RANGE nodes, uncorrelated subqueries hoisted
//! into derived tables, and literals optionally auto-parameterized for the
//! plan cache.
//!
//! The rewriter is single-threaded, performs no I/O, and mutates the
//! statement's arena in place. All documented rewrites are applied to a
//! fixed point in a deterministic order; an unprovable rewrite condition
//! silently declines the rewrite and never fails the invocation.

mod context;
pub mod join;
pub mod normalize;
pub mod post;
pub mod simplify;
pub mod subquery;

pub use context::RewriteContext;

use requel_common::{RewriteResult, Transformed};
use requel_model::visit::{for_each_node, WalkScope};
use requel_model::{NodeId, NodeKind, Select};

/// A predicate-bearing clause of a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clause {
    Where,
    Having,
    OrderByFor,
}

/// The conjunct-list head of `clause` on a statement node; statements
/// without the clause answer `None`.
pub(crate) fn clause_head(
    arena: &requel_model::NodeArena,
    stmt: NodeId,
    clause: Clause,
) -> Option<NodeId> {
    match (&arena[stmt].kind, clause) {
        (NodeKind::Select(select), Clause::Where) => select.where_clause,
        (NodeKind::Select(select), Clause::Having) => select.having,
        (NodeKind::Select(select), Clause::OrderByFor) => select.orderby_for,
        (NodeKind::Update(update), Clause::Where) => update.where_clause,
        (NodeKind::Delete(delete), Clause::Where) => delete.where_clause,
        _ => None,
    }
}

pub(crate) fn set_clause_head(
    arena: &mut requel_model::NodeArena,
    stmt: NodeId,
    clause: Clause,
    head: Option<NodeId>,
) {
    match (&mut arena[stmt].kind, clause) {
        (NodeKind::Select(select), Clause::Where) => select.where_clause = head,
        (NodeKind::Select(select), Clause::Having) => select.having = head,
        (NodeKind::Select(select), Clause::OrderByFor) => select.orderby_for = head,
        (NodeKind::Update(update), Clause::Where) => update.where_clause = head,
        (NodeKind::Delete(delete), Clause::Where) => delete.where_clause = head,
        _ => {}
    }
}

/// Cheap clone of a Select payload (all fields are ids and flags).
pub(crate) fn select_parts(arena: &requel_model::NodeArena, stmt: NodeId) -> Option<Select> {
    arena[stmt].as_select().cloned()
}

/// One rewrite pass over a single statement node.
///
/// Passes mutate the arena in place and report whether they changed
/// anything; an unprovable condition is a `Transformed::no`, never an
/// error.
pub trait RewritePass {
    fn name(&self) -> &str;

    fn rewrite(
        &self,
        ctx: &mut RewriteContext<'_>,
        stmt: NodeId,
    ) -> RewriteResult<Transformed<()>>;
}

/// Options of one rewriter invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RewriterOptions {
    /// Replace literal operands with host-variable placeholders so the
    /// resulting plan can be cached and reused.
    pub auto_parameterize: bool,
}

/// The rewrite driver.
///
/// Applies the five components in their documented order to every SELECT
/// of the statement, leaves first: derived tables and predicate subqueries
/// are rewritten before their enclosing query.
#[derive(Debug, Default)]
pub struct Rewriter {
    options: RewriterOptions,
}

impl Rewriter {
    pub fn new(options: RewriterOptions) -> Self {
        Self { options }
    }

    /// Rewrites the statement rooted at `root`, returning the (possibly
    /// re-parented) root.
    pub fn rewrite(&self, ctx: &mut RewriteContext<'_>, root: NodeId) -> RewriteResult<NodeId> {
        self.rewrite_statement(ctx, root)?;
        Ok(root)
    }

    fn rewrite_statement(&self, ctx: &mut RewriteContext<'_>, stmt: NodeId) -> RewriteResult<()> {
        // Leaves first: every directly nested query (derived table,
        // predicate subquery, set-operation arm) is rewritten before this
        // statement looks at its own clauses.
        let mut nested = Vec::new();
        for_each_node(ctx.arena, stmt, WalkScope::SkipQueries, &mut |id, node| {
            if id != stmt && node.is_query() {
                nested.push(id);
            }
        });
        for query in nested {
            self.rewrite_statement(ctx, query)?;
        }

        match &ctx.arena[stmt].kind {
            NodeKind::Select(_) => self.rewrite_select(ctx, stmt),
            NodeKind::Update(_) | NodeKind::Delete(_) => self.rewrite_dml(ctx, stmt),
            // Set operations and INSERT carry no clauses of their own; the
            // nested queries above covered their arms.
            _ => Ok(()),
        }
    }

    fn rewrite_select(&self, ctx: &mut RewriteContext<'_>, select: NodeId) -> RewriteResult<()> {
        join::JoinStructuralizer.rewrite(ctx, select)?;
        subquery::SubqueryRewriter.rewrite(ctx, select)?;
        normalize::PredicateNormalizer.rewrite(ctx, select)?;
        simplify::AlgebraicSimplifier.rewrite(ctx, select)?;
        post::PostProcessor::new(self.options).rewrite(ctx, select)?;
        Ok(())
    }

    fn rewrite_dml(&self, ctx: &mut RewriteContext<'_>, stmt: NodeId) -> RewriteResult<()> {
        normalize::PredicateNormalizer.rewrite(ctx, stmt)?;
        simplify::AlgebraicSimplifier.rewrite(ctx, stmt)?;
        Ok(())
    }
}

/// Rewrites a statement with default options.
pub fn rewrite(ctx: &mut RewriteContext<'_>, root: NodeId) -> RewriteResult<NodeId> {
    Rewriter::default().rewrite(ctx, root)
}

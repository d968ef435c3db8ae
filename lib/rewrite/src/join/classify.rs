//! Path-join classification.
//!
//! Every spec with path entities ends up PathInner, PathOuter or
//! PathOuterWeasel. An outer path is strengthened to inner when the WHERE,
//! with the path's attributes replaced by NULL, provably folds to FALSE:
//! such a WHERE kills every NULL-extended row, so outer and inner
//! traversal agree. Non-folding is unknown, never a proof.

use crate::simplify::where_folds_false;
use crate::{select_parts, RewriteContext};
use requel_common::{RewriteResult, Transformed};
use requel_model::visit::{references_spec, substitute_in_tree};
use requel_model::{NodeId, SpecId, SpecMetaClass};

pub(crate) fn classify_paths(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
) -> RewriteResult<Transformed<()>> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(Transformed::no(()));
    };
    let mut changed = false;
    for spec in ctx.arena.list(select.from) {
        changed |= classify_spec(ctx, stmt, spec)?;
    }
    Ok(Transformed::new((), changed))
}

fn classify_spec(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    spec_node: NodeId,
) -> RewriteResult<bool> {
    let Some(spec) = ctx.arena[spec_node].as_spec() else {
        return Ok(false);
    };
    let entities = spec.path_entities.clone();
    let spec_id = spec.id;
    let before = spec.meta_class;
    if entities.is_empty() || before == SpecMetaClass::PathInner {
        return Ok(false);
    }

    let mut changed = false;
    for child in &entities {
        changed |= classify_spec(ctx, stmt, *child)?;
    }

    let combined = combine(ctx, &entities);
    let meta = if combined == SpecMetaClass::PathInner {
        SpecMetaClass::PathInner
    } else if where_references(ctx, stmt, spec_id) {
        if null_substitution_folds_false(ctx, stmt, spec_id)? {
            SpecMetaClass::PathInner
        } else {
            SpecMetaClass::PathOuterWeasel
        }
    } else {
        combined
    };

    if meta != before {
        if let Some(spec) = ctx.arena[spec_node].as_spec_mut() {
            spec.meta_class = meta;
        }
        changed = true;
    }
    Ok(changed)
}

/// Lattice over the children: any inner child forces inner, any non-outer
/// child degrades to weasel, otherwise the path stays outer.
fn combine(ctx: &RewriteContext<'_>, entities: &[NodeId]) -> SpecMetaClass {
    let metas: Vec<SpecMetaClass> = entities
        .iter()
        .filter_map(|&e| ctx.arena[e].as_spec().map(|s| s.meta_class))
        .collect();
    if metas.contains(&SpecMetaClass::PathInner) {
        SpecMetaClass::PathInner
    } else if metas.iter().any(|&m| m != SpecMetaClass::PathOuter) {
        SpecMetaClass::PathOuterWeasel
    } else {
        SpecMetaClass::PathOuter
    }
}

fn where_references(ctx: &RewriteContext<'_>, stmt: NodeId, spec_id: SpecId) -> bool {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return false;
    };
    ctx.arena
        .list(select.where_clause)
        .into_iter()
        .any(|c| references_spec(ctx.arena, c, spec_id))
}

/// Copies the WHERE, substitutes NULL for every attribute of the spec,
/// and asks the constant folder whether the result is provably false.
fn null_substitution_folds_false(
    ctx: &mut RewriteContext<'_>,
    stmt: NodeId,
    spec_id: SpecId,
) -> RewriteResult<bool> {
    let Some(select) = select_parts(ctx.arena, stmt) else {
        return Ok(false);
    };
    let Some(where_head) = select.where_clause else {
        return Ok(false);
    };
    let copy = ctx.arena.copy_list(where_head)?;
    let null = ctx.arena.new_null()?;
    for conjunct in ctx.arena.list(Some(copy)) {
        substitute_in_tree(ctx.arena, conjunct, spec_id, None, null)?;
    }
    Ok(where_folds_false(ctx.arena, Some(copy)))
}

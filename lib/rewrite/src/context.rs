use requel_common::SchemaProvider;
use requel_model::visit::{for_each_node, WalkScope};
use requel_model::{NodeArena, NodeId, SpecId, ValueData};

/// Per-invocation state of one rewrite.
///
/// Wraps the parser arena and the caller's host-variable vector, and owns
/// the alias and auto-parameter counters; nothing here is static, so the
/// rewriter stays reentrant across disjoint arenas.
pub struct RewriteContext<'a> {
    pub arena: &'a mut NodeArena,
    pub schema: &'a dyn SchemaProvider,
    /// Auto-parameterized literal values, appended in placeholder order.
    pub host_vars: &'a mut Vec<ValueData>,
    alias_counter: u32,
    next_spec: u32,
}

impl<'a> RewriteContext<'a> {
    /// Creates a context for one statement rooted at `root`.
    ///
    /// The spec-id counter continues after the highest id the parser
    /// assigned anywhere in the statement.
    pub fn new(
        arena: &'a mut NodeArena,
        schema: &'a dyn SchemaProvider,
        host_vars: &'a mut Vec<ValueData>,
        root: NodeId,
    ) -> Self {
        let mut max_spec = 0;
        for_each_node(arena, root, WalkScope::IntoQueries, &mut |_, node| {
            if let Some(spec) = node.as_spec() {
                max_spec = max_spec.max(spec.id.0);
            }
        });
        Self {
            arena,
            schema,
            host_vars,
            alias_counter: 0,
            next_spec: max_spec,
        }
    }

    /// A fresh derived-table alias, unique within this invocation.
    pub fn fresh_alias(&mut self) -> String {
        self.alias_counter += 1;
        format!("dt{}", self.alias_counter)
    }

    /// A fresh derived-column name, drawn from the same counter as aliases
    /// so the two can never collide.
    pub fn fresh_column(&mut self) -> String {
        self.alias_counter += 1;
        format!("c{}", self.alias_counter)
    }

    pub fn fresh_spec_id(&mut self) -> SpecId {
        self.next_spec += 1;
        SpecId(self.next_spec)
    }

    /// Appends a literal to the host-variable vector, returning its index.
    pub fn add_host_var(&mut self, value: ValueData) -> u32 {
        self.host_vars.push(value);
        u32::try_from(self.host_vars.len() - 1).unwrap_or(u32::MAX)
    }
}

use requel_model::{DataTypeDescriptor, SpecId, SqlType};
use rustc_hash::FxHashMap;

/// Opaque handle to a catalog class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassHandle(pub String);

/// Resolved domain of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Domain {
    pub type_enum: SqlType,
    pub data_type: Option<DataTypeDescriptor>,
    pub nullable: bool,
}

/// Narrow read-only view of the catalog.
///
/// The rewriter holds no locks and never writes; a missing answer makes
/// the pass that asked skip its rewrite, never fail.
pub trait SchemaProvider {
    fn is_shared_attr(&self, class: &ClassHandle, name: &str) -> bool;
    fn is_partition_key(&self, class: &ClassHandle, name: &str) -> bool;
    fn class_of(&self, spec_id: SpecId) -> Option<ClassHandle>;
    fn attribute_domain(&self, class: &ClassHandle, name: &str) -> Option<Domain>;
}

/// A schema provider that answers nothing; every type-dependent rewrite
/// declines conservatively.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySchema;

impl SchemaProvider for EmptySchema {
    fn is_shared_attr(&self, _class: &ClassHandle, _name: &str) -> bool {
        false
    }

    fn is_partition_key(&self, _class: &ClassHandle, _name: &str) -> bool {
        false
    }

    fn class_of(&self, _spec_id: SpecId) -> Option<ClassHandle> {
        None
    }

    fn attribute_domain(&self, _class: &ClassHandle, _name: &str) -> Option<Domain> {
        None
    }
}

#[derive(Clone, Debug, Default)]
struct ClassEntry {
    attributes: FxHashMap<String, Domain>,
    shared: Vec<String>,
    partition_keys: Vec<String>,
}

/// Map-backed [SchemaProvider] for embedders and tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySchema {
    classes: FxHashMap<String, ClassEntry>,
    spec_classes: FxHashMap<SpecId, String>,
}

impl MemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class with its attribute domains.
    pub fn add_class(&mut self, class: &str, attributes: &[(&str, Domain)]) {
        let entry = self.classes.entry(class.into()).or_default();
        for (name, domain) in attributes {
            entry.attributes.insert((*name).into(), *domain);
        }
    }

    pub fn mark_shared(&mut self, class: &str, attr: &str) {
        self.classes
            .entry(class.into())
            .or_default()
            .shared
            .push(attr.into());
    }

    pub fn mark_partition_key(&mut self, class: &str, attr: &str) {
        self.classes
            .entry(class.into())
            .or_default()
            .partition_keys
            .push(attr.into());
    }

    /// Binds a spec to its class, as resolution would.
    pub fn bind_spec(&mut self, spec_id: SpecId, class: &str) {
        self.spec_classes.insert(spec_id, class.into());
    }
}

impl SchemaProvider for MemorySchema {
    fn is_shared_attr(&self, class: &ClassHandle, name: &str) -> bool {
        self.classes
            .get(&class.0)
            .is_some_and(|c| c.shared.iter().any(|s| s == name))
    }

    fn is_partition_key(&self, class: &ClassHandle, name: &str) -> bool {
        self.classes
            .get(&class.0)
            .is_some_and(|c| c.partition_keys.iter().any(|s| s == name))
    }

    fn class_of(&self, spec_id: SpecId) -> Option<ClassHandle> {
        self.spec_classes.get(&spec_id).cloned().map(ClassHandle)
    }

    fn attribute_domain(&self, class: &ClassHandle, name: &str) -> Option<Domain> {
        self.classes
            .get(&class.0)
            .and_then(|c| c.attributes.get(name))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_schema_round_trip() {
        let mut schema = MemorySchema::new();
        let domain = Domain {
            type_enum: SqlType::Integer,
            data_type: None,
            nullable: true,
        };
        schema.add_class("t", &[("a", domain)]);
        schema.mark_partition_key("t", "a");
        schema.bind_spec(SpecId(1), "t");

        let class = schema.class_of(SpecId(1)).unwrap();
        assert_eq!(schema.attribute_domain(&class, "a"), Some(domain));
        assert!(schema.is_partition_key(&class, "a"));
        assert!(!schema.is_shared_attr(&class, "a"));
        assert_eq!(schema.class_of(SpecId(9)), None);
    }
}

use crate::errors::ScopeResult;
use crate::types::{Instance, TypeKey};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Zero-argument constructor used when a type must be lazily created.
pub type Factory = Arc<dyn Fn() -> ScopeResult<Instance> + Send + Sync>;

/// Per-type configuration supplied when a dependency type is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyConfig {
    /// When false the app-root never creates or stores the type; each thread
    /// root creates its own instance instead.
    pub thread_sharable: bool,
    /// Field names `ScopedClone` implementations are asked to reset instead of copy.
    pub skip_fields: BTreeSet<&'static str>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            thread_sharable: true,
            skip_fields: BTreeSet::new(),
        }
    }
}

impl DependencyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One instance per thread; never shared through the app-root.
    pub fn per_thread() -> Self {
        Self {
            thread_sharable: false,
            ..Self::default()
        }
    }

    pub fn thread_sharable(mut self, sharable: bool) -> Self {
        self.thread_sharable = sharable;
        self
    }

    pub fn skip_field(mut self, name: &'static str) -> Self {
        self.skip_fields.insert(name);
        self
    }

    pub fn skip_fields(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
        self.skip_fields.extend(names);
        self
    }
}

/// A declared dependency type.
pub struct TypeEntry {
    pub key: TypeKey,
    pub config: DependencyConfig,
    pub factory: Option<Factory>,
}

impl std::fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeEntry")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

use crate::dependencies::types::{DependencyConfig, Factory, TypeEntry};
use crate::errors::{BoxError, ScopeError};
use crate::types::{Instance, TypeKey};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

static TYPE_REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

/// **DECLARED TYPE REGISTRY**
///
/// **PURPOSE**: Process-wide table of per-type configuration and factories
/// **GUARANTEE**: Undeclared types behave as thread-sharable with no factory
pub struct TypeRegistry {
    entries: RwLock<HashMap<TypeKey, TypeEntry>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The registry consulted by every scope.
    pub fn global() -> &'static TypeRegistry {
        &TYPE_REGISTRY
    }

    /// **DECLARE TYPE**
    ///
    /// Re-declaring replaces the configuration but keeps a previously declared factory.
    pub fn declare(&self, key: TypeKey, config: DependencyConfig) {
        log::debug!(
            "Declaring {} (thread_sharable={}, skip_fields={:?})",
            key,
            config.thread_sharable,
            config.skip_fields
        );
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(entry) => entry.config = config,
            None => {
                entries.insert(
                    key,
                    TypeEntry {
                        key,
                        config,
                        factory: None,
                    },
                );
            }
        }
    }

    pub fn declare_with_factory(&self, key: TypeKey, config: DependencyConfig, factory: Factory) {
        log::debug!(
            "Declaring {} with factory (thread_sharable={})",
            key,
            config.thread_sharable
        );
        self.entries.write().insert(
            key,
            TypeEntry {
                key,
                config,
                factory: Some(factory),
            },
        );
    }

    pub fn is_declared(&self, key: &TypeKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn config(&self, key: &TypeKey) -> DependencyConfig {
        self.entries
            .read()
            .get(key)
            .map(|entry| entry.config.clone())
            .unwrap_or_default()
    }

    pub fn is_thread_sharable(&self, key: &TypeKey) -> bool {
        self.entries
            .read()
            .get(key)
            .map_or(true, |entry| entry.config.thread_sharable)
    }

    pub fn skip_fields(&self, key: &TypeKey) -> BTreeSet<&'static str> {
        self.config(key).skip_fields
    }

    pub fn factory(&self, key: &TypeKey) -> Option<Factory> {
        self.entries
            .read()
            .get(key)
            .and_then(|entry| entry.factory.clone())
    }

    /// Remove a declaration; returns whether one existed.
    pub fn forget(&self, key: &TypeKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Declare the configuration of `T` in the global registry.
pub fn declare<T: ?Sized + 'static>(config: DependencyConfig) {
    TypeRegistry::global().declare(TypeKey::of::<T>(), config);
}

/// Declare `T` together with the factory used to lazily create it.
///
/// Factory errors surface as `ScopeError::Construction` to the caller of `get`.
pub fn declare_with_factory<T, F, E>(config: DependencyConfig, factory: F)
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn() -> Result<Arc<T>, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    let type_name = std::any::type_name::<T>();
    let erased: Factory = Arc::new(move || {
        factory()
            .map(Instance::new)
            .map_err(|source| ScopeError::Construction {
                type_name,
                source: source.into(),
            })
    });
    TypeRegistry::global().declare_with_factory(TypeKey::of::<T>(), config, erased);
}

pub fn is_thread_sharable(key: &TypeKey) -> bool {
    TypeRegistry::global().is_thread_sharable(key)
}

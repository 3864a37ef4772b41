//! # RESOLUTION
//!
//! **ORDER**: local store -> ancestor cache -> parent chain -> lazy construction
//! **GUARANTEE**: No scope lock is held while a parent resolves or a constructor runs

use crate::dependencies::registry::{is_thread_sharable, TypeRegistry};
use crate::errors::{ScopeError, ScopeResult};
use crate::scope::node::ScopeNode;
use crate::types::{Instance, TypeKey};
use std::sync::Arc;

/// Constructor handed down the parent chain; `None` means "look up only".
pub type Construct<'a> = Option<&'a dyn Fn() -> ScopeResult<Instance>>;

enum Upstream {
    // Active: parent fixed at activation time
    Fixed(Option<ScopeNode>),
    // Inactive: parent looked up on every call
    Floating,
}

impl ScopeNode {
    /// **RESOLVE**
    ///
    /// **STEPS**:
    /// 1. Local store
    /// 2. Cache of ancestor values
    /// 3. App-root refuses types that are not thread-sharable
    /// 4. Parent chain (an inactive scope delegates fully and caches nothing)
    /// 5. Lazy construction into the local store when nothing above provided a value
    ///
    /// With `create == None` nothing is stored in any scope along the way.
    pub fn resolve(&self, key: &TypeKey, create: Construct<'_>) -> ScopeResult<Option<Instance>> {
        let upstream = {
            let state = self.state();
            if let Some(found) = state.local.get(key) {
                return Ok(Some(found.clone()));
            }
            if let Some(found) = state.cache.get(key) {
                log::trace!("Scope {}: cache hit for {}", self.name(), key);
                return Ok(Some(found.clone()));
            }
            match &state.activation {
                Some(activation) => Upstream::Fixed(activation.parent.clone()),
                None => Upstream::Floating,
            }
        };

        if self.is_app_root() && !is_thread_sharable(key) {
            return Ok(None);
        }

        let inherited = match upstream {
            Upstream::Fixed(Some(parent)) => parent.resolve(key, create)?,
            Upstream::Fixed(None) => None,
            Upstream::Floating => match self.floating_parent()? {
                Some(parent) => return parent.resolve(key, create),
                None => None,
            },
        };

        let Some(construct) = create else {
            return Ok(inherited);
        };

        match inherited {
            Some(value) => {
                let mut state = self.state();
                // Only an active scope is reachable by the invalidation walk
                if state.activation.is_some() {
                    state.cache.insert(*key, value.clone());
                }
                Ok(Some(value))
            }
            None => {
                let made = construct()?;
                if made.key() != *key {
                    return Err(ScopeError::TypeMismatch {
                        expected: key.name(),
                    });
                }
                let stored = self.state().local.entry(*key).or_insert(made).clone();
                log::debug!("Scope {}: created {}", self.name(), key);
                Ok(Some(stored))
            }
        }
    }

    fn resolve_as<T: ?Sized + 'static>(
        &self,
        key: &TypeKey,
        create: Construct<'_>,
    ) -> ScopeResult<Option<Arc<T>>> {
        self.resolve(key, create)?
            .map(|instance| instance.expect_type::<T>())
            .transpose()
    }

    fn require<T: ?Sized + 'static>(
        &self,
        key: &TypeKey,
        construct: &dyn Fn() -> ScopeResult<Instance>,
    ) -> ScopeResult<Arc<T>> {
        self.resolve_as::<T>(key, Some(construct))?.ok_or_else(|| {
            ScopeError::invariant(
                "SCOPE_INVARIANT_CREATE_RETURNED_NOTHING",
                format!("scope '{}' produced no value for {}", self.name(), key),
            )
        })
    }

    /// **GET OR CREATE**
    ///
    /// **RETURNS**: The value of `T` visible from this scope, created with the
    /// declared factory or `T::default()` if no scope in the chain has one
    pub fn get<T: Default + Send + Sync + 'static>(&self) -> ScopeResult<Arc<T>> {
        let key = TypeKey::of::<T>();
        let declared = TypeRegistry::global().factory(&key);
        let fallback = || -> ScopeResult<Instance> { Ok(Instance::from_value(T::default())) };
        match &declared {
            Some(factory) => self.require::<T>(&key, &**factory),
            None => self.require::<T>(&key, &fallback),
        }
    }

    /// Like `get`, but for types without `Default`; requires a declared factory
    /// unless some scope in the chain already holds a value.
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> ScopeResult<Arc<T>> {
        let key = TypeKey::of::<T>();
        let declared = TypeRegistry::global().factory(&key);
        let missing = || -> ScopeResult<Instance> {
            Err(ScopeError::NotConstructible {
                type_name: key.name(),
            })
        };
        match &declared {
            Some(factory) => self.require::<T>(&key, &**factory),
            None => self.require::<T>(&key, &missing),
        }
    }

    /// `get` with a caller supplied constructor, used only if nothing in the chain has a `T`.
    pub fn get_with<T, F>(&self, factory: F) -> ScopeResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T>,
    {
        let key = TypeKey::of::<T>();
        let construct = || -> ScopeResult<Instance> { Ok(Instance::new(factory())) };
        self.require::<T>(&key, &construct)
    }

    /// **LOOKUP ONLY**
    ///
    /// **GUARANTEE**: Never creates or stores anything, in this scope or above it
    pub fn find<T: ?Sized + Send + Sync + 'static>(&self) -> ScopeResult<Option<Arc<T>>> {
        self.resolve_as::<T>(&TypeKey::of::<T>(), None)
    }

    /// Values of `T` held by this scope and each ancestor, nearest first,
    /// skipping repeats of the same instance.
    pub fn dependency_chain<T: Default + Send + Sync + 'static>(
        &self,
        create: bool,
    ) -> ScopeResult<Vec<Arc<T>>> {
        let key = TypeKey::of::<T>();
        let declared = TypeRegistry::global().factory(&key);
        let fallback = || -> ScopeResult<Instance> { Ok(Instance::from_value(T::default())) };
        let construct: &dyn Fn() -> ScopeResult<Instance> = match &declared {
            Some(factory) => &**factory,
            None => &fallback,
        };

        let mut seen = Vec::new();
        let mut values = Vec::new();
        for node in self.parent_chain()? {
            // The app-root yields nothing for per-thread types
            let Some(value) = node.resolve_as::<T>(&key, create.then_some(construct))? else {
                continue;
            };
            let addr = Arc::as_ptr(&value) as *const () as usize;
            if seen.contains(&addr) {
                continue;
            }
            seen.push(addr);
            values.push(value);
        }
        Ok(values)
    }

    /// Type-erased lookup of whatever is stored for `key`, without creating.
    pub fn find_instance(&self, key: &TypeKey) -> ScopeResult<Option<Instance>> {
        self.resolve(key, None)
    }
}

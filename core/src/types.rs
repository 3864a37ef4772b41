//! # LAZYSCOPE TYPE DEFINITIONS
//!
//! **CRITICAL**: Type-erased keys and values stored inside every scope
//! **MANDATE**: ALL stores and caches MUST be keyed by `TypeKey` and hold `Instance`

use crate::errors::{ScopeError, ScopeResult};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// **TYPE KEY**
///
/// **PURPOSE**: Identifies one dependency slot inside a scope
/// **GUARANTEE**: Equality and hashing use only the `TypeId`; the name is for diagnostics
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// **CONSTRUCTOR** - Works for unsized keys such as `dyn Trait`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, used in compact renderings.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// **INSTANCE HANDLE**
///
/// **PURPOSE**: Type-erased shared pointer to a dependency value
/// **GUARANTEE**: Cloning never clones the value; identity is the address of the value
///
/// The erased payload is the `Arc<T>` itself, so `T` may be unsized and a
/// concrete value can be registered under a trait-object key.
#[derive(Clone)]
pub struct Instance {
    key: TypeKey,
    value: Arc<dyn Any + Send + Sync>,
    addr: usize,
}

impl Instance {
    /// **CONSTRUCTOR** - Store `value` under the key of `T`
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let addr = Arc::as_ptr(&value) as *const () as usize;
        Self {
            key: TypeKey::of::<T>(),
            value: Arc::new(value),
            addr,
        }
    }

    /// **OWNED CONSTRUCTOR** - Wraps a plain value in an `Arc`
    pub fn from_value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// **DOWNCAST**
    ///
    /// **RETURNS**: The shared value if it was stored as `Arc<T>`
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Downcast that reports a mismatch as an error instead of `None`.
    pub fn expect_type<T: ?Sized + 'static>(&self) -> ScopeResult<Arc<T>> {
        self.downcast::<T>().ok_or(ScopeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    }

    /// True when both handles point at the same value.
    pub fn same_as(&self, other: &Instance) -> bool {
        self.addr == other.addr
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({} @ {:#x})", self.key.name(), self.addr)
    }
}

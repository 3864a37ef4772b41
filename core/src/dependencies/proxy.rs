use crate::dependencies::Dependency;
use crate::errors::ScopeResult;
use crate::scope::current_scope;
use std::fmt;
use std::sync::Arc;

type Resolve<T> = Arc<dyn Fn() -> ScopeResult<Arc<T>> + Send + Sync>;

/// **CURRENT DEPENDENCY**
///
/// **PURPOSE**: Long-lived handle to "whatever `T` is current right now"
/// **GUARANTEE**: Never caches; every access resolves through the calling thread's scope
pub struct CurrentDependency<T: ?Sized> {
    resolve: Resolve<T>,
    label: Option<&'static str>,
}

impl<T: Dependency> CurrentDependency<T> {
    pub fn new() -> Self {
        Self {
            resolve: Arc::new(T::grab),
            label: None,
        }
    }
}

impl<T: Dependency> Default for CurrentDependency<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> CurrentDependency<T> {
    /// Proxy for a type without `Default`, e.g. a trait object seeded by the caller.
    pub fn declared() -> Self {
        Self {
            resolve: Arc::new(|| current_scope().try_get::<T>()),
            label: None,
        }
    }

    pub fn get(&self) -> ScopeResult<Arc<T>> {
        (self.resolve)()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> ScopeResult<R> {
        let current = self.get()?;
        Ok(f(&*current))
    }

    /// Project the current value; the projection runs on every access.
    pub fn map<U, F>(&self, grabber: F) -> CurrentDependency<U>
    where
        U: ?Sized + Send + Sync + 'static,
        F: Fn(&T) -> Arc<U> + Send + Sync + 'static,
    {
        let resolve = Arc::clone(&self.resolve);
        CurrentDependency {
            resolve: Arc::new(move || resolve().map(|current| grabber(&*current))),
            label: self.label,
        }
    }

    /// Name shown by `Debug` instead of the type name.
    pub fn labelled(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}

impl<T: ?Sized> Clone for CurrentDependency<T> {
    fn clone(&self) -> Self {
        Self {
            resolve: Arc::clone(&self.resolve),
            label: self.label,
        }
    }
}

impl<T: ?Sized> fmt::Debug for CurrentDependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.label.unwrap_or_else(std::any::type_name::<T>);
        write!(f, "CurrentDependency<{}>", target)
    }
}

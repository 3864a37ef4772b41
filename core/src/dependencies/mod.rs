//! # DEPENDENCY TYPES
//!
//! **PURPOSE**: Per-type declarations and the thin accessors built on top of
//! the scope hierarchy

pub mod proxy;
pub mod registry;
pub mod types;

pub use proxy::CurrentDependency;
pub use registry::{declare, declare_with_factory, is_thread_sharable, TypeRegistry};
pub use types::{DependencyConfig, Factory, TypeEntry};

use crate::errors::ScopeResult;
use crate::scope::{current_scope, ScopeGuard, ScopeNode};
use crate::types::TypeKey;
use std::collections::BTreeSet;
use std::sync::Arc;

/// **DEPENDENCY**
///
/// **PURPOSE**: Type-bound shortcuts for a value resolved through the current scope
///
/// Implement it with an empty `impl` block; every method has a default.
pub trait Dependency: Default + Send + Sync + 'static {
    /// The instance visible from the current scope, created if needed.
    fn grab() -> ScopeResult<Arc<Self>> {
        current_scope().get::<Self>()
    }

    /// Like `grab`, but never creates.
    fn find_current() -> ScopeResult<Option<Arc<Self>>> {
        current_scope().find::<Self>()
    }

    /// Enter a new scope holding `self`; dropping the guard exits it.
    fn activate(self) -> ScopeResult<ScopeGuard> {
        ScopeNode::with_instance(self)?.enter()
    }

    /// Call `f` while `self` is the current instance.
    fn run_with<R>(self, f: impl FnOnce() -> R) -> ScopeResult<R> {
        let guard = self.activate()?;
        let output = f();
        guard.exit()?;
        Ok(output)
    }

    /// Scope that activates a fresh copy holding a clone of `self` on every `enter`.
    fn template(&self) -> ScopeResult<ScopeNode>
    where
        Self: Clone,
    {
        ScopeNode::builder()
            .seed(self.clone())
            .copy_as_template(true)
            .build()
    }

    /// **WRAP**
    ///
    /// **RETURNS**: `f` wrapped so every call runs in its own scope holding
    /// this value; values added during a call are dropped when it returns
    fn wrap<R, F>(&self, f: F) -> ScopeResult<Box<dyn Fn() -> ScopeResult<R>>>
    where
        Self: Clone,
        R: 'static,
        F: Fn() -> R + 'static,
    {
        Ok(Box::new(self.template()?.wrap(f)))
    }

    /// A handle that resolves the current instance on every access.
    fn proxy() -> CurrentDependency<Self> {
        CurrentDependency::new()
    }
}

/// Clone that resets the named fields to their defaults instead of copying them.
pub trait ScopedClone: Sized {
    fn clone_skipping(&self, skip: &BTreeSet<&'static str>) -> Self;
}

/// **COPY CURRENT**
///
/// **RETURNS**: A clone of the current `T`, honoring the skip list `T` was declared with
pub fn copy_current<T: Dependency + ScopedClone>() -> ScopeResult<T> {
    let current = T::grab()?;
    let skip = TypeRegistry::global().skip_fields(&TypeKey::of::<T>());
    Ok(current.clone_skipping(&skip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::activation_depth;

    #[derive(Debug, Default)]
    struct Settings {
        level: u32,
    }

    impl Dependency for Settings {}

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Session {
        user: String,
        token: Option<String>,
    }

    impl Dependency for Session {}

    impl ScopedClone for Session {
        fn clone_skipping(&self, skip: &BTreeSet<&'static str>) -> Self {
            Session {
                user: if skip.contains("user") {
                    String::default()
                } else {
                    self.user.clone()
                },
                token: if skip.contains("token") {
                    None
                } else {
                    self.token.clone()
                },
            }
        }
    }

    #[test]
    fn test_grab_is_stable_within_scope() {
        ScopeNode::scoped(|_| {
            let first = Settings::grab().unwrap();
            let second = Settings::grab().unwrap();
            assert!(Arc::ptr_eq(&first, &second));
        })
        .unwrap();
    }

    #[test]
    fn test_activate_shadows_outer_value() {
        ScopeNode::scoped(|_| {
            let outer = Settings::grab().unwrap();
            {
                let _guard = Settings { level: 7 }.activate().unwrap();
                assert_eq!(Settings::grab().unwrap().level, 7);
            }
            assert!(Arc::ptr_eq(&Settings::grab().unwrap(), &outer));
        })
        .unwrap();
    }

    #[test]
    fn test_run_with_balances_stack() {
        let depth = activation_depth();
        let level = Settings { level: 3 }
            .run_with(|| {
                assert_eq!(activation_depth(), depth + 1);
                Settings::grab().unwrap().level
            })
            .unwrap();
        assert_eq!(level, 3);
        assert_eq!(activation_depth(), depth);
    }

    #[test]
    fn test_wrap_reuses_value_for_every_call() {
        #[derive(Debug, Default, Clone)]
        struct Tenant {
            name: &'static str,
        }

        impl Dependency for Tenant {}

        let tenant = Tenant { name: "acme" };
        let call = tenant
            .wrap(|| {
                let scratch = current_scope().add(Settings { level: 1 }).is_ok();
                (Tenant::grab().unwrap().name, scratch)
            })
            .unwrap();

        assert_eq!(call().unwrap(), ("acme", true));
        assert_eq!(call().unwrap(), ("acme", true));
        assert_eq!(tenant.name, "acme");
    }

    #[test]
    fn test_find_current_does_not_create() {
        #[derive(Default)]
        struct NeverAsked;
        impl Dependency for NeverAsked {}

        ScopeNode::builder()
            .detached()
            .build()
            .unwrap()
            .run(|_| assert!(NeverAsked::find_current().unwrap().is_none()))
            .unwrap();
    }

    #[test]
    fn test_copy_current_honors_skip_fields() {
        declare::<Session>(DependencyConfig::new().skip_field("token"));

        let session = Session {
            user: "ada".to_string(),
            token: Some("secret".to_string()),
        };
        let copied = session
            .run_with(|| copy_current::<Session>().unwrap())
            .unwrap();

        assert_eq!(copied.user, "ada");
        assert_eq!(copied.token, None);
    }
}

//! Test support: isolate a test from scopes left behind by earlier ones.

use crate::scope::{reset_roots, RootRegistry, ScopeNode};
use std::marker::PhantomData;

/// **FRESH ROOTS**
///
/// **PURPOSE**: Reset the global roots when created and again when dropped
///
/// Resets are process-wide, so tests holding one must not run concurrently
/// with other tests that use the roots.
#[must_use = "roots are reset again as soon as the guard is dropped"]
pub struct FreshRoots {
    _not_send: PhantomData<*const ()>,
}

impl FreshRoots {
    pub fn new() -> Self {
        reset_roots();
        Self {
            _not_send: PhantomData,
        }
    }

    /// The app-root created by the reset.
    pub fn app_root(&self) -> ScopeNode {
        RootRegistry::global().app_root()
    }

    /// The calling thread's root under the fresh app-root.
    pub fn thread_root(&self) -> ScopeNode {
        RootRegistry::global().thread_root()
    }
}

impl Default for FreshRoots {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FreshRoots {
    fn drop(&mut self) {
        reset_roots();
    }
}

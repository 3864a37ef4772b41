//! Scoped acquisition: entering scopes, re-entrant copies and the
//! run-with-scope combinators.

use crate::errors::ScopeResult;
use crate::scope::activation::{self, ScopeGuard};
use crate::scope::node::ScopeNode;

impl ScopeNode {
    /// **ENTER**
    ///
    /// **PURPOSE**: Make this scope the current one on the calling thread
    /// **RETURNS**: A guard that exits the scope when dropped
    ///
    /// If the scope is already active a shallow copy is activated instead and
    /// linked to it as a sibling, so values added to the copy also land in
    /// this scope. Scopes built with `copy_as_template` always activate a
    /// fresh copy, see [`ScopeNode::enter_as_template`].
    pub fn enter(&self) -> ScopeResult<ScopeGuard> {
        if self.copies_as_template() {
            return self.enter_as_template();
        }

        if self.is_active() {
            let copy = self.copy();
            copy.set_sibling(self.clone());
            log::debug!("Scope {} already active; entering copy {}", self.name(), copy.name());
            let generation = activation::activate(&copy)?;
            return Ok(ScopeGuard::new(copy, self.clone(), generation));
        }

        let generation = activation::activate(self)?;
        Ok(ScopeGuard::new(self.clone(), self.clone(), generation))
    }

    /// Activate a disposable copy: it starts from this scope's values and
    /// anything added while active is dropped on exit.
    pub fn enter_as_template(&self) -> ScopeResult<ScopeGuard> {
        let copy = self.copy();
        let generation = activation::activate(&copy)?;
        Ok(ScopeGuard::new(copy, self.clone(), generation))
    }

    /// **RUN IN SCOPE**
    ///
    /// Enter, call `f` with the activated scope, exit. The scope is exited
    /// even if `f` panics; an exit failure is returned after `f` completed.
    pub fn run<R>(&self, f: impl FnOnce(&ScopeNode) -> R) -> ScopeResult<R> {
        let guard = self.enter()?;
        let output = f(guard.node());
        guard.exit()?;
        Ok(output)
    }

    /// `run` on a disposable copy of this scope.
    pub fn run_as_template<R>(&self, f: impl FnOnce(&ScopeNode) -> R) -> ScopeResult<R> {
        let guard = self.enter_as_template()?;
        let output = f(guard.node());
        guard.exit()?;
        Ok(output)
    }

    /// Wrap `f` so every call runs inside its own copy of this scope.
    pub fn wrap<R, F>(&self, f: F) -> impl Fn() -> ScopeResult<R>
    where
        F: Fn() -> R,
    {
        let template = self.clone();
        move || template.run_as_template(|_| f())
    }

    /// Run `f` inside a fresh blank scope parented to the current one.
    pub fn scoped<R>(f: impl FnOnce(&ScopeNode) -> R) -> ScopeResult<R> {
        ScopeNode::new().run(f)
    }
}

/// Enter `node`, call `f`, exit `node`.
pub fn run_with_scope<R>(node: &ScopeNode, f: impl FnOnce() -> R) -> ScopeResult<R> {
    node.run(|_| f())
}

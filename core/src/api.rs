pub use crate::dependencies::{
    copy_current, declare, declare_with_factory, CurrentDependency, Dependency, DependencyConfig,
    ScopedClone, TypeRegistry,
};
pub use crate::errors::{BoxError, ScopeError, ScopeResult};
pub use crate::scope::{
    activation_depth, current_scope, reset_roots, run_with_scope, NodeRole, ParentSpec,
    RootRegistry, ScopeBuilder, ScopeGuard, ScopeNode, ScopeSnapshot,
};
pub use crate::types::{Instance, TypeKey};

//! # SCOPE HIERARCHY
//!
//! **ARCHITECTURE**: Scope nodes chained to a per-thread root, which is
//! chained to a single process-wide app-root
//! **GUARANTEE**: Activation is LIFO per thread and exits even on panic

pub mod activation;
pub mod node;
pub mod resolver;
pub mod roots;
pub mod template;


pub use activation::{activation_depth, ScopeGuard};
pub use node::{NodeRole, ParentSpec, ScopeBuilder, ScopeNode, ScopeSnapshot};
pub use resolver::Construct;
pub use roots::{current_scope, reset_roots, RootRegistry};
pub use template::run_with_scope;

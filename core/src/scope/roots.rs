use crate::scope::activation;
use crate::scope::node::{Activation, NodeInner, NodeRole, ParentLink, ScopeNode};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

/// Global root registry instance
static ROOT_REGISTRY: Lazy<RootRegistry> = Lazy::new(RootRegistry::new);

struct RootState {
    generation: u64,
    app_root: ScopeNode,
    thread_roots: HashMap<ThreadId, Weak<NodeInner>>,
}

/// Process-wide roots: one app-root shared by every thread and one lazily
/// created root per thread anchored to it.
pub struct RootRegistry {
    state: RwLock<RootState>,
}

impl RootRegistry {
    fn new() -> Self {
        Self {
            state: RwLock::new(RootState {
                generation: 0,
                app_root: new_app_root(),
                thread_roots: HashMap::new(),
            }),
        }
    }

    /// Get the global root registry instance
    pub fn global() -> &'static RootRegistry {
        &ROOT_REGISTRY
    }

    /// Force creation of the app-root; later calls are no-ops.
    pub fn init() -> &'static RootRegistry {
        let registry = Self::global();
        log::debug!(
            "Root registry ready (app-root {})",
            registry.state.read().app_root.name()
        );
        registry
    }

    pub fn app_root(&self) -> ScopeNode {
        self.state.read().app_root.clone()
    }

    /// Bumped by every `reset`; thread state from an older generation is discarded.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub(crate) fn roots(&self) -> (u64, ScopeNode) {
        let state = self.state.read();
        (state.generation, state.app_root.clone())
    }

    /// The calling thread's root, created on first use.
    pub fn thread_root(&self) -> ScopeNode {
        activation::thread_root()
    }

    /// The innermost active scope on the calling thread, or its root.
    pub fn current(&self) -> ScopeNode {
        activation::current_node()
    }

    /// Number of thread roots whose threads are still alive.
    pub fn thread_root_count(&self) -> usize {
        self.state
            .read()
            .thread_roots
            .values()
            .filter(|root| root.strong_count() > 0)
            .count()
    }

    pub(crate) fn register_thread_root(&self, generation: u64, root: &ScopeNode) {
        let mut state = self.state.write();
        if state.generation != generation {
            return;
        }
        state.thread_roots.retain(|_, root| root.strong_count() > 0);
        state
            .thread_roots
            .insert(std::thread::current().id(), Arc::downgrade(&root.inner));
    }

    /// **RESET ROOTS**
    ///
    /// **PURPOSE**: Give every later access a clean slate (used between tests)
    /// **GUARANTEE**: Idempotent; the resolution algorithm itself is unchanged
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.app_root = new_app_root();
        state.thread_roots.clear();
        log::debug!(
            "Roots reset to generation {} (app-root {})",
            state.generation,
            state.app_root.name()
        );
    }
}

fn new_app_root() -> ScopeNode {
    let root = ScopeNode::create(ParentLink::RootLike, NodeRole::AppRoot, Some("AppRoot"), false);
    root.state().activation = Some(Activation { parent: None });
    root
}

/// The innermost active scope on the calling thread.
pub fn current_scope() -> ScopeNode {
    activation::current_node()
}

/// Reset the global roots, see [`RootRegistry::reset`].
pub fn reset_roots() {
    RootRegistry::global().reset();
}

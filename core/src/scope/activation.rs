//! Per-thread activation stack and the enter/exit state machine.
//!
//! Every thread keeps its own stack of active scopes plus a lazily created
//! thread root. Activation is strictly LIFO per thread; a `ScopeGuard`
//! deactivates its scope when exited or dropped.

use crate::errors::{ScopeError, ScopeResult};
use crate::scope::node::{Activation, NodeRole, ParentLink, ScopeNode};
use crate::scope::roots::RootRegistry;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::Deref;

#[derive(Default)]
struct ThreadScopes {
    generation: u64,
    root: Option<ScopeNode>,
    stack: Vec<ScopeNode>,
}

thread_local! {
    static THREAD_SCOPES: RefCell<ThreadScopes> = RefCell::new(ThreadScopes::default());
}

// Current scope if the thread state belongs to this generation.
fn current_if_fresh(generation: u64) -> Option<ScopeNode> {
    THREAD_SCOPES.with(|cell| {
        let scopes = cell.borrow();
        if scopes.generation != generation {
            return None;
        }
        scopes
            .stack
            .last()
            .or(scopes.root.as_ref())
            .cloned()
    })
}

/// Current scope on this thread, bootstrapping the thread root when needed.
pub(crate) fn current_node() -> ScopeNode {
    let (generation, app_root) = RootRegistry::global().roots();
    if let Some(node) = current_if_fresh(generation) {
        return node;
    }
    bootstrap(generation, app_root)
}

pub(crate) fn thread_root() -> ScopeNode {
    let (generation, app_root) = RootRegistry::global().roots();
    let existing = THREAD_SCOPES.with(|cell| {
        let scopes = cell.borrow();
        if scopes.generation == generation {
            scopes.root.clone()
        } else {
            None
        }
    });
    match existing {
        Some(root) => root,
        None => bootstrap(generation, app_root),
    }
}

fn bootstrap(generation: u64, app_root: ScopeNode) -> ScopeNode {
    let thread = std::thread::current();
    let label = format!("ThreadRoot-{}", thread.name().unwrap_or("unnamed"));
    let root = ScopeNode::create(ParentLink::Dynamic, NodeRole::ThreadRoot, Some(&label), false);
    root.state().activation = Some(Activation {
        parent: Some(app_root.clone()),
    });
    app_root.adopt(&root);
    RootRegistry::global().register_thread_root(generation, &root);

    THREAD_SCOPES.with(|cell| {
        let mut scopes = cell.borrow_mut();
        if !scopes.stack.is_empty() {
            log::warn!(
                "Roots were reset; discarding {} active scope(s) on {:?}",
                scopes.stack.len(),
                thread.id()
            );
        }
        scopes.stack.clear();
        scopes.root = Some(root.clone());
        scopes.generation = generation;
    });
    log::debug!("Created {} under {}", root.name(), app_root.name());
    root
}

/// Number of scopes activated on this thread and not yet exited.
pub fn activation_depth() -> usize {
    let generation = RootRegistry::global().generation();
    THREAD_SCOPES.with(|cell| {
        let scopes = cell.borrow();
        if scopes.generation == generation {
            scopes.stack.len()
        } else {
            0
        }
    })
}

/// **ACTIVATE**
///
/// **STEPS**: resolve parent -> mark active -> register with parent -> push
/// **RETURNS**: Root generation the activation belongs to
pub(crate) fn activate(node: &ScopeNode) -> ScopeResult<u64> {
    let (generation, app_root) = RootRegistry::global().roots();
    let current = current_if_fresh(generation).unwrap_or_else(|| bootstrap(generation, app_root));

    let parent = match &node.inner.link {
        ParentLink::Dynamic => Some(current),
        ParentLink::Detached | ParentLink::RootLike => None,
        ParentLink::Explicit(parent) => Some(parent.clone()),
    };

    if let Some(parent) = &parent {
        if parent.ptr_eq(node) {
            return Err(ScopeError::invariant(
                "SCOPE_INVARIANT_SELF_PARENT",
                format!("scope '{}' cannot be activated as its own parent", node.name()),
            ));
        }
        if parent.parent_chain()?.iter().any(|ancestor| ancestor.ptr_eq(node)) {
            return Err(ScopeError::invariant(
                "SCOPE_INVARIANT_PARENT_CYCLE",
                format!(
                    "scope '{}' is already an ancestor of its parent '{}'",
                    node.name(),
                    parent.name()
                ),
            ));
        }
    }

    {
        let mut state = node.state();
        if state.activation.is_some() {
            return Err(ScopeError::invariant(
                "SCOPE_INVARIANT_ALREADY_ACTIVE",
                format!("scope '{}' is already active", node.name()),
            ));
        }
        state.activation = Some(Activation {
            parent: parent.clone(),
        });
        state.cache.clear();
        state.chain = None;
    }

    if let Some(parent) = &parent {
        parent.adopt(node);
    }
    THREAD_SCOPES.with(|cell| cell.borrow_mut().stack.push(node.clone()));

    log::debug!(
        "Activated scope {} (parent={})",
        node.name(),
        parent.as_ref().map_or("None", |parent| parent.name())
    );
    Ok(generation)
}

/// **DEACTIVATE**
///
/// **STEPS**: pop and verify stack -> mark inactive -> clear caches -> leave parent
/// **ERRORS**: `InvariantViolation` on improper nesting or leftover active children
pub(crate) fn deactivate(node: &ScopeNode, generation: u64) -> ScopeResult<()> {
    if RootRegistry::global().generation() == generation {
        THREAD_SCOPES.with(|cell| {
            let mut scopes = cell.borrow_mut();
            if scopes.generation != generation {
                return Ok(());
            }
            match scopes.stack.last() {
                Some(top) if top.ptr_eq(node) => {
                    scopes.stack.pop();
                    Ok(())
                }
                Some(top) => Err(ScopeError::invariant(
                    "SCOPE_INVARIANT_EXIT_ORDER",
                    format!(
                        "exiting scope '{}' but the current scope is '{}'",
                        node.name(),
                        top.name()
                    ),
                )),
                None => Err(ScopeError::invariant(
                    "SCOPE_INVARIANT_EXIT_EMPTY_STACK",
                    format!("exiting scope '{}' with nothing active", node.name()),
                )),
            }
        })?;
    } else {
        log::debug!(
            "Scope {} exits after a roots reset; activation stack untouched",
            node.name()
        );
    }

    let former_parent = {
        let mut state = node.state();
        let activation = state.activation.take().ok_or_else(|| {
            ScopeError::invariant(
                "SCOPE_INVARIANT_NOT_ACTIVE",
                format!("scope '{}' exited while inactive", node.name()),
            )
        })?;
        state.cache.clear();
        state.chain = None;
        activation.parent
    };
    if let Some(parent) = &former_parent {
        parent.disown(node.id());
    }
    log::debug!("Deactivated scope {}", node.name());

    let leftover = node.live_children();
    if !leftover.is_empty() {
        let names: Vec<&str> = leftover.iter().map(ScopeNode::name).collect();
        return Err(ScopeError::invariant(
            "SCOPE_INVARIANT_ACTIVE_CHILDREN",
            format!(
                "scope '{}' deactivated while descendants are still active: {}",
                node.name(),
                names.join(", ")
            ),
        ));
    }
    Ok(())
}

/// **SCOPE GUARD**
///
/// **PURPOSE**: Keeps a scope active until exited or dropped
/// **GUARANTEE**: Exit always runs, including while unwinding
///
/// Guards are bound to the thread that created them and must be released in
/// reverse order of creation.
#[must_use = "the scope is exited as soon as the guard is dropped"]
pub struct ScopeGuard {
    node: ScopeNode,
    template: ScopeNode,
    generation: u64,
    exited: bool,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub(crate) fn new(node: ScopeNode, template: ScopeNode, generation: u64) -> Self {
        Self {
            node,
            template,
            generation,
            exited: false,
            _not_send: PhantomData,
        }
    }

    /// The scope that was activated.
    pub fn node(&self) -> &ScopeNode {
        &self.node
    }

    /// The scope `enter` was called on; differs from `node` when a copy was activated.
    pub fn template(&self) -> &ScopeNode {
        &self.template
    }

    pub fn is_copy(&self) -> bool {
        !self.node.ptr_eq(&self.template)
    }

    /// Exit explicitly and observe invariant failures as errors.
    pub fn exit(mut self) -> ScopeResult<()> {
        self.exited = true;
        deactivate(&self.node, self.generation)
    }
}

impl Deref for ScopeGuard {
    type Target = ScopeNode;

    fn deref(&self) -> &ScopeNode {
        &self.node
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        if let Err(err) = deactivate(&self.node, self.generation) {
            // Already logged where it was raised; a second panic would abort
            if !std::thread::panicking() {
                panic!("{}", err);
            }
        }
    }
}

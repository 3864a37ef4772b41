//! Scope nodes: construction, the local store and its invalidation walk,
//! shallow copies, parent chains and diagnostics.

use crate::errors::{ScopeError, ScopeResult};
use crate::scope::activation;
use crate::types::{Instance, TypeKey};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// Sequence used for diagnostic names only
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// **PARENT SELECTION**
///
/// **PURPOSE**: How a scope finds its parent when it is activated
#[derive(Clone)]
pub enum ParentSpec {
    /// Use whatever scope is current on the activating thread.
    Dynamic,
    /// No parent at all, the scope acts as a root for its chain.
    Detached,
    /// Always this scope.
    Explicit(ScopeNode),
}

impl From<Option<ScopeNode>> for ParentSpec {
    fn from(parent: Option<ScopeNode>) -> Self {
        match parent {
            Some(node) => ParentSpec::Explicit(node),
            None => ParentSpec::Detached,
        }
    }
}

impl From<ScopeNode> for ParentSpec {
    fn from(parent: ScopeNode) -> Self {
        ParentSpec::Explicit(parent)
    }
}

// Internal form of `ParentSpec`. `RootLike` resolves to no parent but its
// copies attach dynamically; only the app-root is created with it.
#[derive(Clone)]
pub(crate) enum ParentLink {
    Dynamic,
    Detached,
    RootLike,
    Explicit(ScopeNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Scope,
    ThreadRoot,
    AppRoot,
}

pub(crate) struct Activation {
    pub(crate) parent: Option<ScopeNode>,
}

#[derive(Default)]
pub(crate) struct NodeState {
    pub(crate) local: HashMap<TypeKey, Instance>,
    pub(crate) cache: HashMap<TypeKey, Instance>,
    // Ancestors only; holding self here would leak the node
    pub(crate) chain: Option<Vec<ScopeNode>>,
    pub(crate) children: HashMap<u64, Weak<NodeInner>>,
    pub(crate) activation: Option<Activation>,
    pub(crate) sibling: Option<ScopeNode>,
}

pub(crate) struct NodeInner {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) link: ParentLink,
    pub(crate) role: NodeRole,
    pub(crate) copy_as_template: bool,
    pub(crate) state: Mutex<NodeState>,
}

/// **SCOPE NODE**
///
/// **PURPOSE**: One level of the type-keyed dependency hierarchy
/// **GUARANTEE**: Cheap to clone; clones are handles to the same scope
///
/// A scope owns the values added to it, memoizes values borrowed from its
/// ancestors while it is active, and lazily creates values nobody above it
/// provides.
#[derive(Clone)]
pub struct ScopeNode {
    pub(crate) inner: Arc<NodeInner>,
}

/// Builder for scopes that need more than the defaults.
pub struct ScopeBuilder {
    parent: ParentSpec,
    label: Option<String>,
    copy_as_template: bool,
    seeds: Vec<Instance>,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self {
            parent: ParentSpec::Dynamic,
            label: None,
            copy_as_template: false,
            seeds: Vec::new(),
        }
    }
}

impl ScopeBuilder {
    pub fn parent(mut self, parent: impl Into<ParentSpec>) -> Self {
        self.parent = parent.into();
        self
    }

    /// Equivalent to `parent(None)`.
    pub fn detached(mut self) -> Self {
        self.parent = ParentSpec::Detached;
        self
    }

    /// Appended to the sequence number in the scope name.
    pub fn name(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Every `enter` activates a fresh copy, so values added while active are discarded.
    pub fn copy_as_template(mut self, enabled: bool) -> Self {
        self.copy_as_template = enabled;
        self
    }

    pub fn seed<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.seeds.push(Instance::from_value(value));
        self
    }

    /// Seed under the key of `T`, which may be a trait object.
    pub fn seed_arc<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.seeds.push(Instance::new(value));
        self
    }

    pub fn seed_instance(mut self, instance: Instance) -> Self {
        self.seeds.push(instance);
        self
    }

    /// **BUILD**
    ///
    /// **RETURNS**: An inactive scope, or `DuplicateRegistration` when two seeds share a key
    pub fn build(self) -> ScopeResult<ScopeNode> {
        let link = match self.parent {
            ParentSpec::Dynamic => ParentLink::Dynamic,
            ParentSpec::Detached => ParentLink::Detached,
            ParentSpec::Explicit(node) => ParentLink::Explicit(node),
        };
        let node = ScopeNode::create(
            link,
            NodeRole::Scope,
            self.label.as_deref(),
            self.copy_as_template,
        );
        for seed in self.seeds {
            node.add_instance(seed)?;
        }
        Ok(node)
    }
}

impl ScopeNode {
    pub(crate) fn create(
        link: ParentLink,
        role: NodeRole,
        label: Option<&str>,
        copy_as_template: bool,
    ) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let name = match label {
            Some(label) => format!("{}-{}", id, label),
            None => id.to_string(),
        };
        Self {
            inner: Arc::new(NodeInner {
                id,
                name,
                link,
                role,
                copy_as_template,
                state: Mutex::new(NodeState::default()),
            }),
        }
    }

    /// Blank scope whose parent is whatever is current when it is entered.
    pub fn new() -> Self {
        Self::create(ParentLink::Dynamic, NodeRole::Scope, None, false)
    }

    /// Blank scope with no parent.
    pub fn detached() -> Self {
        Self::create(ParentLink::Detached, NodeRole::Scope, None, false)
    }

    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// Dynamic-parent scope seeded with one value.
    pub fn with_instance<T: Send + Sync + 'static>(value: T) -> ScopeResult<Self> {
        Self::builder().seed(value).build()
    }

    pub fn with_instances(instances: impl IntoIterator<Item = Instance>) -> ScopeResult<Self> {
        instances
            .into_iter()
            .fold(Self::builder(), ScopeBuilder::seed_instance)
            .build()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn role(&self) -> NodeRole {
        self.inner.role
    }

    pub fn is_app_root(&self) -> bool {
        self.inner.role == NodeRole::AppRoot
    }

    pub fn is_thread_root(&self) -> bool {
        self.inner.role == NodeRole::ThreadRoot
    }

    pub fn copies_as_template(&self) -> bool {
        self.inner.copy_as_template
    }

    pub fn is_active(&self) -> bool {
        self.state().activation.is_some()
    }

    /// True when both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &ScopeNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner.state.lock()
    }

    /// The older scope this re-entrant copy forwards additions to.
    pub fn sibling(&self) -> Option<ScopeNode> {
        self.state().sibling.clone()
    }

    pub(crate) fn set_sibling(&self, sibling: ScopeNode) {
        self.state().sibling = Some(sibling);
    }

    /// **ADD VALUE**
    ///
    /// Stores `value` under its own type. See [`ScopeNode::add_instance`].
    pub fn add<T: Send + Sync + 'static>(&self, value: T) -> ScopeResult<&Self> {
        self.add_instance(Instance::from_value(value))
    }

    /// Stores a shared value under the key of `T`, which may be a trait object.
    pub fn add_arc<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> ScopeResult<&Self> {
        self.add_instance(Instance::new(value))
    }

    /// **ADD INSTANCE**
    ///
    /// **ERRORS**: `DuplicateRegistration` if this scope, or a sibling it
    /// forwards to, already holds a value for the key. Nothing is stored then.
    ///
    /// On success every cached copy of an ancestor value for the key is
    /// dropped in this scope and all of its descendants.
    pub fn add_instance(&self, instance: Instance) -> ScopeResult<&Self> {
        let key = instance.key();
        let targets = self.sibling_chain();

        for target in &targets {
            if target.state().local.contains_key(&key) {
                return Err(ScopeError::DuplicateRegistration {
                    type_name: key.name(),
                    scope: target.name().to_string(),
                });
            }
        }

        for target in &targets {
            target.state().local.insert(key, instance.clone());
            log::debug!("Scope {}: added {}", target.name(), key);
            target.forget_cached(&key);
        }
        Ok(self)
    }

    // Self followed by the sibling it shadows, that sibling's sibling, and so on.
    fn sibling_chain(&self) -> Vec<ScopeNode> {
        let mut chain = vec![self.clone()];
        let mut cursor = self.sibling();
        while let Some(node) = cursor {
            if chain.iter().any(|seen| seen.ptr_eq(&node)) {
                break;
            }
            cursor = node.sibling();
            chain.push(node);
        }
        chain
    }

    /// Drop a cached ancestor value here and in every descendant.
    pub(crate) fn forget_cached(&self, key: &TypeKey) {
        let children = {
            let mut state = self.state();
            if state.cache.remove(key).is_some() {
                log::trace!("Scope {}: invalidated cached {}", self.name(), key);
            }
            state.children.retain(|_, child| child.strong_count() > 0);
            state
                .children
                .values()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        };
        for inner in children {
            ScopeNode { inner }.forget_cached(key);
        }
    }

    pub(crate) fn adopt(&self, child: &ScopeNode) {
        let mut state = self.state();
        state.children.retain(|_, weak| weak.strong_count() > 0);
        state.children.insert(child.id(), Arc::downgrade(&child.inner));
    }

    pub(crate) fn disown(&self, child_id: u64) {
        self.state().children.remove(&child_id);
    }

    pub(crate) fn live_children(&self) -> Vec<ScopeNode> {
        self.state()
            .children
            .values()
            .filter_map(Weak::upgrade)
            .map(|inner| ScopeNode { inner })
            .collect()
    }

    /// Returns true if a value for `T` was added to this exact scope.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.state().local.contains_key(&TypeKey::of::<T>())
    }

    /// Keys of the values owned by this scope, sorted by type name.
    pub fn local_types(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.state().local.keys().copied().collect();
        keys.sort_by_key(|key| key.name());
        keys
    }

    pub fn cached_types(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.state().cache.keys().copied().collect();
        keys.sort_by_key(|key| key.name());
        keys
    }

    /// **SHALLOW COPY**
    ///
    /// **RETURNS**: An inactive scope owning the same values (not clones of them)
    ///
    /// Copies of a detached scope stay detached, copies of the app-root and of
    /// dynamic scopes attach to whatever is current when entered.
    pub fn copy(&self) -> ScopeNode {
        let link = match &self.inner.link {
            ParentLink::Detached => ParentLink::Detached,
            ParentLink::Explicit(parent) => ParentLink::Explicit(parent.clone()),
            ParentLink::Dynamic | ParentLink::RootLike => ParentLink::Dynamic,
        };
        let label = self
            .inner
            .name
            .split_once('-')
            .map(|(_, label)| label.to_string());
        let copy = ScopeNode::create(link, NodeRole::Scope, label.as_deref(), self.inner.copy_as_template);
        copy.state().local = self.state().local.clone();
        copy
    }

    /// Deep copies are disabled; values are shared handles with no generic way to duplicate them.
    pub fn deep_copy(&self) -> ScopeResult<ScopeNode> {
        Err(ScopeError::UnsupportedOperation {
            operation: "deep_copy",
            message: format!(
                "scope '{}' can only be shallow copied; use ScopeNode::copy",
                self.name()
            ),
        })
    }

    /// **PARENT**
    ///
    /// While active this is the parent fixed at activation. An inactive
    /// dynamic scope reports the scope current on the calling thread.
    pub fn parent(&self) -> ScopeResult<Option<ScopeNode>> {
        let fixed = self
            .state()
            .activation
            .as_ref()
            .map(|activation| activation.parent.clone());
        match fixed {
            Some(parent) => Ok(parent),
            None => self.floating_parent(),
        }
    }

    pub(crate) fn floating_parent(&self) -> ScopeResult<Option<ScopeNode>> {
        match &self.inner.link {
            ParentLink::Dynamic => {
                let current = activation::current_node();
                if current.ptr_eq(self) {
                    return Err(ScopeError::invariant(
                        "SCOPE_INVARIANT_SELF_PARENT",
                        format!("scope '{}' resolved itself as its own parent", self.name()),
                    ));
                }
                Ok(Some(current))
            }
            ParentLink::Detached | ParentLink::RootLike => Ok(None),
            ParentLink::Explicit(parent) => Ok(Some(parent.clone())),
        }
    }

    /// **PARENT CHAIN**
    ///
    /// **RETURNS**: Self followed by every ancestor, nearest first
    ///
    /// Memoized while the scope is active since its ancestry cannot change then.
    pub fn parent_chain(&self) -> ScopeResult<Vec<ScopeNode>> {
        if let Some(ancestors) = self.state().chain.clone() {
            let mut chain = Vec::with_capacity(ancestors.len() + 1);
            chain.push(self.clone());
            chain.extend(ancestors);
            return Ok(chain);
        }

        let mut chain = vec![self.clone()];
        let mut cursor = self.parent()?;
        while let Some(node) = cursor {
            if chain.iter().any(|seen| seen.ptr_eq(&node)) {
                return Err(ScopeError::invariant(
                    "SCOPE_INVARIANT_PARENT_CYCLE",
                    format!("scope '{}' appears twice in its own parent chain", node.name()),
                ));
            }
            cursor = node.parent()?;
            chain.push(node);
        }

        let mut state = self.state();
        if state.activation.is_some() {
            state.chain = Some(chain[1..].to_vec());
        }
        Ok(chain)
    }

    /// Diagnostic view of this scope.
    pub fn snapshot(&self) -> ScopeSnapshot {
        let state = self.state();
        let mut local_types: Vec<&'static str> = state.local.keys().map(TypeKey::name).collect();
        local_types.sort_unstable();
        let mut cached_types: Vec<&'static str> = state.cache.keys().map(TypeKey::name).collect();
        cached_types.sort_unstable();
        ScopeSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            role: self.role(),
            active: state.activation.is_some(),
            parent: state
                .activation
                .as_ref()
                .and_then(|activation| activation.parent.as_ref().map(ScopeNode::id)),
            sibling: state.sibling.as_ref().map(ScopeNode::id),
            local_types,
            cached_types,
            children: state
                .children
                .values()
                .filter(|child| child.strong_count() > 0)
                .count(),
        }
    }
}

impl Default for ScopeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ScopeNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ScopeNode {}

impl fmt::Display for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (types, parent) = {
            let state = self.state();
            let types = if !state.local.is_empty() && state.local.len() < 3 {
                let mut names: Vec<&str> = state.local.keys().map(TypeKey::short_name).collect();
                names.sort_unstable();
                format!("dependency_type={}", names.join(";"))
            } else {
                format!("dependency_count={}", state.local.len())
            };
            let parent = match &state.activation {
                Some(Activation { parent: Some(parent) }) => parent.name().to_string(),
                Some(Activation { parent: None }) => "None".to_string(),
                None => match &self.inner.link {
                    ParentLink::Dynamic => "Dynamic".to_string(),
                    ParentLink::Detached | ParentLink::RootLike => "None".to_string(),
                    ParentLink::Explicit(parent) => parent.name().to_string(),
                },
            };
            (types, parent)
        };
        write!(f, "ScopeNode(name='{}', {}, parent={})", self.name(), types, parent)
    }
}

impl fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Serializable view of a scope, see [`ScopeNode::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSnapshot {
    pub id: u64,
    pub name: String,
    pub role: NodeRole,
    pub active: bool,
    pub parent: Option<u64>,
    pub sibling: Option<u64>,
    pub local_types: Vec<&'static str>,
    pub cached_types: Vec<&'static str>,
    pub children: usize,
}

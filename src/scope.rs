//! Scope nodes
//!
//! Every container handle points at a scope. A scope owns its
//! registrations, a LIFO disposal bag and a cache of enumeration
//! snapshots, and links to its parent for lookups that miss locally.

use crate::engine::Engine;
use crate::pipeline::Pipeline;
use crate::registration::RegistrationManager;
use crate::storage::Registry;
use crate::{Container, ContainerOptions, Contract, DiError, Result, TypeKey, Value};
use ahash::{AHashSet, RandomState};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Unique scope identifier.
///
/// Each scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

enum Disposal {
    Value(Value),
    Callback(Box<dyn FnOnce() + Send>),
}

/// Deduplicated registration names for one element type
pub(crate) struct Snapshot {
    version: u64,
    names: Vec<Option<Arc<str>>>,
}

impl Snapshot {
    pub fn names(&self) -> &[Option<Arc<str>>] {
        &self.names
    }
}

pub(crate) struct Scope {
    id: ScopeId,
    depth: u32,
    parent: Option<Arc<Scope>>,
    engine: Arc<Engine>,
    registry: Registry,
    disposals: Mutex<Vec<Disposal>>,
    snapshots: DashMap<(TypeKey, bool), Arc<Snapshot>, RandomState>,
    disposed: AtomicBool,
}

impl Scope {
    pub fn root(engine: Arc<Engine>) -> Self {
        let scope = Self::with_parent(engine, None, 0);

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_pipeline",
            scope = %scope.id,
            "Creating root container"
        );

        scope
    }

    pub fn child(parent: &Arc<Scope>) -> Self {
        let scope = Self::with_parent(
            Arc::clone(&parent.engine),
            Some(Arc::clone(parent)),
            parent.depth + 1,
        );

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_pipeline",
            scope = %scope.id,
            parent = %parent.id,
            depth = scope.depth,
            "Creating child container"
        );

        scope
    }

    fn with_parent(engine: Arc<Engine>, parent: Option<Arc<Scope>>, depth: u32) -> Self {
        let registry = Registry::with_capacity(engine.options().initial_capacity);
        registry.insert(Arc::new(RegistrationManager::internal(
            Contract::of::<Container>(),
            crate::Lifetime::Transient.manager(),
            Pipeline::pinned("container", |ctx| {
                Some(Value::from_owned(ctx.container().clone()))
            }),
        )));

        Self {
            id: ScopeId::new(),
            depth,
            parent,
            engine,
            registry,
            disposals: Mutex::new(Vec::new()),
            snapshots: DashMap::with_hasher(RandomState::new()),
            disposed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[inline]
    pub fn options(&self) -> &ContainerOptions {
        self.engine.options()
    }

    fn ancestors(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |scope| scope.parent.as_deref())
    }

    /// Add a registration, replacing any local one for the same contract
    pub fn register(&self, manager: RegistrationManager) -> Result<()> {
        if self.is_disposed() {
            return Err(DiError::ContainerDisposed);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_pipeline",
            scope = %self.id,
            contract = %manager.contract(),
            category = manager.category().name(),
            lifetime = manager.lifetime().name(),
            "Registering"
        );

        if let Some(replaced) = self.registry.insert(Arc::new(manager)) {
            self.retire(replaced);
        }
        self.engine.bump_generation();
        Ok(())
    }

    /// Registration for `contract`, searching ancestors.
    ///
    /// Scope-sensitive registrations found in an ancestor are copied into
    /// this scope; open generic registrations are closed over the
    /// requested type in the scope that owns them. Copies and closed
    /// registrations are re-derived once their source has been replaced.
    pub fn find(&self, contract: &Contract) -> Option<Arc<RegistrationManager>> {
        if let Some((owner, manager)) = self.find_declared(contract) {
            return Some(self.adopt(owner, contract, manager));
        }

        let definition = contract.key().definition()?;
        let open = Contract::new(TypeKey::open(definition), contract.name());
        let (owner, generic) = self.find_declared(&open)?;
        let (closed, replaced) = owner.registry.get_or_replace_with(
            contract,
            |closed| closed.is_derived_from(&generic),
            || RegistrationManager::close_generic(&generic, contract),
        );

        if let Some(stale) = replaced {
            #[cfg(feature = "logging")]
            debug!(
                target: "ioc_pipeline",
                contract = %contract,
                definition = %definition,
                "Re-closing generic registration"
            );

            owner.retire(stale);
        }

        Some(self.adopt(owner, contract, closed))
    }

    /// Nearest registration made directly for `contract`, skipping copies
    /// and closed generics cached along the way
    fn find_declared(&self, contract: &Contract) -> Option<(&Scope, Arc<RegistrationManager>)> {
        self.ancestors().find_map(|scope| {
            scope
                .registry
                .get(contract)
                .filter(|manager| !manager.is_derived())
                .map(|manager| (scope, manager))
        })
    }

    fn adopt(
        &self,
        owner: &Scope,
        contract: &Contract,
        manager: Arc<RegistrationManager>,
    ) -> Arc<RegistrationManager> {
        if std::ptr::eq(owner, self) || !manager.lifetime().is_scope_sensitive() {
            return manager;
        }
        let (copy, replaced) = self.registry.get_or_replace_with(
            contract,
            |copy| copy.is_derived_from(&manager),
            || RegistrationManager::clone_for_scope(&manager),
        );
        if let Some(stale) = replaced {
            self.retire(stale);
        }
        copy
    }

    /// Dispose a replaced registration together with this scope
    fn retire(&self, replaced: Arc<RegistrationManager>) {
        self.on_dispose(Box::new(move || replaced.dispose()));
    }

    /// Whether a registration exists without creating copies
    pub fn is_registered(&self, contract: &Contract) -> bool {
        if self.ancestors().any(|scope| scope.registry.contains(contract)) {
            return true;
        }
        match contract.key().definition() {
            Some(definition) => {
                let open = Contract::new(TypeKey::open(definition), contract.name());
                self.ancestors().any(|scope| scope.registry.contains(&open))
            }
            None => false,
        }
    }

    /// Registrations visible from this scope, nearest first
    pub fn registrations(&self) -> Vec<Arc<RegistrationManager>> {
        let mut seen = AHashSet::new();
        let mut all = Vec::new();
        for scope in self.ancestors() {
            for manager in scope.registry.all() {
                if seen.insert(manager.contract().clone()) {
                    all.push(manager);
                }
            }
        }
        all
    }

    /// Names registered for `element`, nearest scope first, each once.
    ///
    /// Cached per scope and rebuilt when any registration was added since.
    pub fn snapshot(&self, element: TypeKey, include_default: bool) -> Arc<Snapshot> {
        let version = self.engine.generation();
        if let Some(snapshot) = self.snapshots.get(&(element, include_default)) {
            if snapshot.version == version {
                return Arc::clone(snapshot.value());
            }
        }

        let open = element.definition().map(TypeKey::open);
        let mut seen: AHashSet<Option<Arc<str>>> = AHashSet::new();
        let mut names = Vec::new();

        for scope in self.ancestors() {
            let mut candidates = scope.registry.for_type(&element);
            if let Some(open) = &open {
                candidates.extend(scope.registry.for_type(open));
            }
            for manager in candidates {
                let name: Option<Arc<str>> = manager.contract().name().map(Arc::from);
                if name.is_none() && !include_default {
                    continue;
                }
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }

        let snapshot = Arc::new(Snapshot { version, names });
        self.snapshots
            .insert((element, include_default), Arc::clone(&snapshot));
        snapshot
    }

    /// Dispose `value` with this scope
    pub fn defer_dispose(&self, value: Value) {
        self.disposals.lock().push(Disposal::Value(value));
    }

    /// Run `callback` when this scope is disposed
    pub fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) {
        self.disposals.lock().push(Disposal::Callback(callback));
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose everything this scope owns, newest first
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let bag = std::mem::take(&mut *self.disposals.lock());

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_pipeline",
            scope = %self.id,
            deferred = bag.len(),
            registrations = self.registry.len(),
            "Disposing container"
        );

        for entry in bag.into_iter().rev() {
            match entry {
                Disposal::Value(value) => value.dispose(),
                Disposal::Callback(callback) => callback(),
            }
        }

        for manager in self.registry.drain().into_iter().rev() {
            manager.dispose();
        }
        self.snapshots.clear();
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("registrations", &self.registry.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_ids_unique() {
        let a = ScopeId::new();
        let b = ScopeId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("scope-"));
    }

    #[test]
    fn test_disposal_is_lifo() {
        let container = Container::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            container
                .scope()
                .on_dispose(Box::new(move || order.lock().push(i)));
        }

        container.dispose();
        assert_eq!(*order.lock(), vec![2, 1, 0]);

        // second dispose is a no-op
        container.dispose();
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn test_child_depth() {
        let root = Container::new();
        let child = root.create_child_container();
        let grandchild = child.create_child_container();
        assert_eq!(root.depth(), 0);
        assert_eq!(grandchild.depth(), 2);
    }
}

//! Lifetime managers
//!
//! A lifetime manager decides whether a registration's resolved value is
//! cached and for how long. The resolution engine asks it for a value
//! before running a pipeline and hands it the result afterwards:
//!
//! ```text
//! get_value ── hit ──────────────────────────────▶ return
//!     │
//!    miss ──▶ run pipeline ── ok ──▶ set_value ──▶ return
//!                    │
//!                  fault ──▶ recover ──▶ propagate
//! ```
//!
//! Synchronized managers keep other threads waiting between a miss and the
//! matching `set_value`/`recover`, bounded by the container's resolve
//! timeout.

use crate::context::Operation;
use crate::scope::{Scope, ScopeId};
use crate::{Contract, DiError, Result, Value, WeakValue};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::warn;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Per-thread values of every [`PerThreadLifetime`], keyed by manager id.
    /// Dropped with the thread.
    static PER_THREAD: RefCell<ahash::AHashMap<u64, Value>> = RefCell::new(ahash::AHashMap::new());
}

/// Registration categories a lifetime manager accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Pre-built instances
    pub instance: bool,
    /// Type mappings built through the strategy chain
    pub types: bool,
    /// Factory delegates
    pub factory: bool,
}

impl Capabilities {
    /// Every category
    pub const ALL: Capabilities = Capabilities {
        instance: true,
        types: true,
        factory: true,
    };

    /// Built values only, no pre-built instances
    pub const BUILT: Capabilities = Capabilities {
        instance: false,
        types: true,
        factory: true,
    };
}

/// Where a lifetime manager is being consulted from.
pub struct LifetimeContext<'a> {
    scope: &'a Scope,
    operation: &'a Operation,
    contract: &'a Contract,
}

impl<'a> LifetimeContext<'a> {
    pub(crate) fn new(scope: &'a Scope, operation: &'a Operation, contract: &'a Contract) -> Self {
        Self {
            scope,
            operation,
            contract,
        }
    }

    /// Scope doing the resolution
    #[inline]
    pub fn scope_id(&self) -> ScopeId {
        self.scope.id()
    }

    /// Contract being resolved
    #[inline]
    pub fn contract(&self) -> &Contract {
        self.contract
    }

    /// How long to wait on another thread's construction
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.scope.options().resolve_timeout
    }

    /// Hand a value to the scope's disposal bag
    pub fn defer_dispose(&self, value: Value) {
        self.scope.defer_dispose(value);
    }

    /// Run a callback when the scope is disposed
    pub fn on_scope_dispose(&self, callback: impl FnOnce() + Send + 'static) {
        self.scope.on_dispose(Box::new(callback));
    }

    /// Value stored for the current top-level resolve
    pub fn per_resolve(&self, id: u64) -> Option<Value> {
        self.operation.get(id)
    }

    /// Store a value for the current top-level resolve
    pub fn set_per_resolve(&self, id: u64, value: Value) {
        self.operation.set(id, value);
    }
}

/// Caching policy for one registration.
///
/// Managers are owned by a single registration. Child scopes that touch a
/// scope-sensitive registration get their own copy via
/// [`LifetimeManager::clone_manager`].
pub trait LifetimeManager: Send + Sync + fmt::Debug {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Which registration categories this manager accepts
    fn capabilities(&self) -> Capabilities;

    /// Cached value, or `None` when the caller should build one.
    ///
    /// Synchronized managers block here while another thread is building
    /// and fault with [`DiError::Timeout`] when the wait exceeds
    /// [`LifetimeContext::timeout`].
    fn get_value(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>>;

    /// Non-blocking peek used by diagnostics
    fn try_get_value(&self, cx: &LifetimeContext<'_>) -> Option<Value>;

    /// Store a freshly built value and release waiters
    fn set_value(&self, value: Value, cx: &LifetimeContext<'_>) -> Result<()>;

    /// Forget the cached value
    fn remove_value(&self, cx: &LifetimeContext<'_>);

    /// Release any hold taken by a `get_value` miss after the build faulted
    fn recover(&self, _cx: &LifetimeContext<'_>) {}

    /// Whether `get_value` can block
    fn is_synchronized(&self) -> bool {
        false
    }

    /// Whether child scopes need their own copy of the manager
    fn is_scope_sensitive(&self) -> bool {
        false
    }

    /// Fresh manager of the same kind
    fn clone_manager(&self) -> Box<dyn LifetimeManager>;

    /// Dispose owned values
    fn dispose(&self) {}
}

// =============================================================================
// Gate
// =============================================================================

#[derive(Debug)]
enum Held {
    Empty,
    Strong(Value),
    Weak(WeakValue),
}

impl Held {
    fn get(&self) -> Option<Value> {
        match self {
            Held::Empty => None,
            Held::Strong(value) => Some(value.clone()),
            Held::Weak(weak) => weak.upgrade(),
        }
    }
}

#[derive(Debug)]
struct GateState {
    held: Held,
    builder: Option<ThreadId>,
}

/// Single cached value with blocking hand-off between a building thread
/// and its waiters.
#[derive(Debug)]
struct Gate {
    state: Mutex<GateState>,
    ready: Condvar,
    weak: bool,
    once: bool,
}

impl Gate {
    fn new(weak: bool, once: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                held: Held::Empty,
                builder: None,
            }),
            ready: Condvar::new(),
            weak,
            once,
        }
    }

    fn acquire(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        let me = thread::current().id();
        let timeout = cx.timeout();
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if let Some(value) = state.held.get() {
                return Ok(Some(value));
            }
            match state.builder {
                None => {
                    state.builder = Some(me);
                    return Ok(None);
                }
                // same thread asking again while building: waiting cannot end
                Some(owner) if owner == me => return Err(DiError::circular(cx.contract())),
                Some(_) => match deadline {
                    Some(deadline) => {
                        if self.ready.wait_until(&mut state, deadline).timed_out() {
                            return match state.held.get() {
                                Some(value) => Ok(Some(value)),
                                None => {
                                    #[cfg(feature = "logging")]
                                    warn!(
                                        target: "ioc_pipeline",
                                        contract = %cx.contract(),
                                        timeout_ms = timeout.as_millis() as u64,
                                        "Lifetime wait timed out"
                                    );
                                    Err(DiError::timeout(cx.contract(), timeout))
                                }
                            };
                        }
                    }
                    None => self.ready.wait(&mut state),
                },
            }
        }
    }

    fn set(&self, value: Value) -> Result<()> {
        let mut state = self.state.lock();
        if self.once && state.held.get().is_some() {
            return Err(DiError::ValueAlreadySet {
                type_name: value.type_name(),
            });
        }
        state.held = if self.weak {
            Held::Weak(value.downgrade())
        } else {
            Held::Strong(value)
        };
        state.builder = None;
        self.ready.notify_all();
        Ok(())
    }

    fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.builder == Some(me) {
            state.builder = None;
            self.ready.notify_all();
        }
    }

    fn peek(&self) -> Option<Value> {
        self.state.try_lock().and_then(|state| state.held.get())
    }

    fn take(&self) -> Option<Value> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut state.held, Held::Empty) {
            Held::Strong(value) => Some(value),
            Held::Weak(weak) => weak.upgrade(),
            Held::Empty => None,
        }
    }
}

// =============================================================================
// Managers
// =============================================================================

/// Never caches; every resolve builds a new value
#[derive(Debug, Default)]
pub struct TransientLifetime;

impl LifetimeManager for TransientLifetime {
    fn name(&self) -> &'static str {
        "Transient"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BUILT
    }

    fn get_value(&self, _cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        Ok(None)
    }

    fn try_get_value(&self, _cx: &LifetimeContext<'_>) -> Option<Value> {
        None
    }

    fn set_value(&self, _value: Value, _cx: &LifetimeContext<'_>) -> Result<()> {
        Ok(())
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {}

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(TransientLifetime)
    }
}

/// One value for the owning container, disposed with it
#[derive(Debug)]
pub struct ContainerControlledLifetime {
    gate: Gate,
}

impl ContainerControlledLifetime {
    pub fn new() -> Self {
        Self {
            gate: Gate::new(false, true),
        }
    }
}

impl Default for ContainerControlledLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeManager for ContainerControlledLifetime {
    fn name(&self) -> &'static str {
        "ContainerControlled"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn get_value(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        self.gate.acquire(cx)
    }

    fn try_get_value(&self, _cx: &LifetimeContext<'_>) -> Option<Value> {
        self.gate.peek()
    }

    fn set_value(&self, value: Value, _cx: &LifetimeContext<'_>) -> Result<()> {
        self.gate.set(value)
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {
        self.gate.take();
    }

    fn recover(&self, _cx: &LifetimeContext<'_>) {
        self.gate.release();
    }

    fn is_synchronized(&self) -> bool {
        true
    }

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(ContainerControlledLifetime::new())
    }

    fn dispose(&self) {
        if let Some(value) = self.gate.take() {
            value.dispose();
        }
    }
}

/// One value per scope; each child scope builds its own
#[derive(Debug, Default)]
pub struct HierarchicalLifetime {
    values: Arc<DashMap<ScopeId, Arc<Gate>, ahash::RandomState>>,
}

impl HierarchicalLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, cx: &LifetimeContext<'_>) -> Arc<Gate> {
        let id = cx.scope_id();
        if let Some(gate) = self.values.get(&id) {
            return Arc::clone(gate.value());
        }

        let mut created = false;
        let gate = Arc::clone(
            self.values
                .entry(id)
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Gate::new(false, true))
                })
                .value(),
        );

        if created {
            let values = Arc::clone(&self.values);
            cx.on_scope_dispose(move || {
                if let Some((_, gate)) = values.remove(&id) {
                    if let Some(value) = gate.take() {
                        value.dispose();
                    }
                }
            });
        }
        gate
    }
}

impl LifetimeManager for HierarchicalLifetime {
    fn name(&self) -> &'static str {
        "Hierarchical"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn get_value(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        self.gate(cx).acquire(cx)
    }

    fn try_get_value(&self, cx: &LifetimeContext<'_>) -> Option<Value> {
        self.values.get(&cx.scope_id()).and_then(|gate| gate.peek())
    }

    fn set_value(&self, value: Value, cx: &LifetimeContext<'_>) -> Result<()> {
        self.gate(cx).set(value)
    }

    fn remove_value(&self, cx: &LifetimeContext<'_>) {
        if let Some(gate) = self.values.get(&cx.scope_id()) {
            gate.take();
        }
    }

    fn recover(&self, cx: &LifetimeContext<'_>) {
        if let Some(gate) = self.values.get(&cx.scope_id()) {
            gate.release();
        }
    }

    fn is_synchronized(&self) -> bool {
        true
    }

    fn is_scope_sensitive(&self) -> bool {
        true
    }

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(HierarchicalLifetime::new())
    }

    fn dispose(&self) {
        let scopes: Vec<ScopeId> = self.values.iter().map(|entry| *entry.key()).collect();
        for id in scopes {
            if let Some((_, gate)) = self.values.remove(&id) {
                if let Some(value) = gate.take() {
                    value.dispose();
                }
            }
        }
    }
}

/// One value per top-level resolve call, shared across that object graph
#[derive(Debug)]
pub struct PerResolveLifetime {
    id: u64,
}

impl PerResolveLifetime {
    pub fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for PerResolveLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeManager for PerResolveLifetime {
    fn name(&self) -> &'static str {
        "PerResolve"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BUILT
    }

    fn get_value(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        Ok(cx.per_resolve(self.id))
    }

    fn try_get_value(&self, cx: &LifetimeContext<'_>) -> Option<Value> {
        cx.per_resolve(self.id)
    }

    fn set_value(&self, value: Value, cx: &LifetimeContext<'_>) -> Result<()> {
        cx.set_per_resolve(self.id, value);
        Ok(())
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {}

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(PerResolveLifetime::new())
    }
}

/// One value per OS thread; never disposed by the container.
///
/// Values live in thread-local storage and are dropped when their thread
/// exits.
#[derive(Debug)]
pub struct PerThreadLifetime {
    id: u64,
}

impl PerThreadLifetime {
    pub fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn current(&self) -> Option<Value> {
        PER_THREAD
            .try_with(|values| values.borrow().get(&self.id).cloned())
            .ok()
            .flatten()
    }

    fn replace(&self, value: Option<Value>) {
        let previous = PER_THREAD
            .try_with(|values| {
                let mut values = values.borrow_mut();
                match value {
                    Some(value) => values.insert(self.id, value),
                    None => values.remove(&self.id),
                }
            })
            .ok()
            .flatten();
        // dropped outside the borrow, its destructor may resolve again
        drop(previous);
    }
}

impl Default for PerThreadLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PerThreadLifetime {
    fn drop(&mut self) {
        self.replace(None);
    }
}

impl LifetimeManager for PerThreadLifetime {
    fn name(&self) -> &'static str {
        "PerThread"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BUILT
    }

    fn get_value(&self, _cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        Ok(self.current())
    }

    fn try_get_value(&self, _cx: &LifetimeContext<'_>) -> Option<Value> {
        self.current()
    }

    fn set_value(&self, value: Value, _cx: &LifetimeContext<'_>) -> Result<()> {
        self.replace(Some(value));
        Ok(())
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {
        self.replace(None);
    }

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(PerThreadLifetime::new())
    }
}

/// Weak reference only; the caller owns the instance
#[derive(Debug)]
pub struct ExternallyControlledLifetime {
    gate: Gate,
}

impl ExternallyControlledLifetime {
    pub fn new() -> Self {
        Self {
            gate: Gate::new(true, false),
        }
    }
}

impl Default for ExternallyControlledLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeManager for ExternallyControlledLifetime {
    fn name(&self) -> &'static str {
        "ExternallyControlled"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn get_value(&self, cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        self.gate.acquire(cx)
    }

    fn try_get_value(&self, _cx: &LifetimeContext<'_>) -> Option<Value> {
        self.gate.peek()
    }

    fn set_value(&self, value: Value, _cx: &LifetimeContext<'_>) -> Result<()> {
        self.gate.set(value)
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {
        self.gate.take();
    }

    fn recover(&self, _cx: &LifetimeContext<'_>) {
        self.gate.release();
    }

    fn is_synchronized(&self) -> bool {
        true
    }

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(ExternallyControlledLifetime::new())
    }
}

/// Never caches, but disposable values are disposed with the scope
#[derive(Debug, Default)]
pub struct ContainerControlledTransientLifetime;

impl LifetimeManager for ContainerControlledTransientLifetime {
    fn name(&self) -> &'static str {
        "ContainerControlledTransient"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BUILT
    }

    fn get_value(&self, _cx: &LifetimeContext<'_>) -> Result<Option<Value>> {
        Ok(None)
    }

    fn try_get_value(&self, _cx: &LifetimeContext<'_>) -> Option<Value> {
        None
    }

    fn set_value(&self, value: Value, cx: &LifetimeContext<'_>) -> Result<()> {
        if value.is_disposable() {
            cx.defer_dispose(value);
        }
        Ok(())
    }

    fn remove_value(&self, _cx: &LifetimeContext<'_>) {}

    fn clone_manager(&self) -> Box<dyn LifetimeManager> {
        Box::new(ContainerControlledTransientLifetime)
    }
}

// =============================================================================
// Lifetime
// =============================================================================

/// Built-in lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// New value on every resolve
    Transient,
    /// One value for the registering container
    Singleton,
    /// One value per scope
    Hierarchical,
    /// One value per top-level resolve
    PerResolve,
    /// One value per thread
    PerThread,
    /// Weakly held, owned by the caller
    External,
    /// New value on every resolve, disposed with the scope
    ContainerTransient,
}

impl Lifetime {
    /// Fresh manager implementing this lifetime
    pub fn manager(self) -> Box<dyn LifetimeManager> {
        match self {
            Lifetime::Transient => Box::new(TransientLifetime),
            Lifetime::Singleton => Box::new(ContainerControlledLifetime::new()),
            Lifetime::Hierarchical => Box::new(HierarchicalLifetime::new()),
            Lifetime::PerResolve => Box::new(PerResolveLifetime::new()),
            Lifetime::PerThread => Box::new(PerThreadLifetime::new()),
            Lifetime::External => Box::new(ExternallyControlledLifetime::new()),
            Lifetime::ContainerTransient => Box::new(ContainerControlledTransientLifetime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolvable, Container};
    use std::sync::Barrier;

    struct Probe;
    resolvable!(Probe);

    fn with_cx<R>(container: &Container, f: impl FnOnce(&LifetimeContext<'_>) -> R) -> R {
        let operation = Operation::new();
        let contract = Contract::of::<Probe>();
        let cx = LifetimeContext::new(container.scope(), &operation, &contract);
        f(&cx)
    }

    #[test]
    fn test_singleton_set_once() {
        let container = Container::new();
        let manager = ContainerControlledLifetime::new();

        with_cx(&container, |cx| {
            assert!(manager.get_value(cx).unwrap().is_none());
            manager.set_value(Value::from_owned(1u32), cx).unwrap();

            let cached = manager.get_value(cx).unwrap().unwrap();
            assert_eq!(*cached.downcast::<u32>().unwrap(), 1);

            let err = manager.set_value(Value::from_owned(2u32), cx).unwrap_err();
            assert!(matches!(err, DiError::ValueAlreadySet { .. }));
        });
    }

    #[test]
    fn test_waiter_times_out() {
        let container = Container::with_options(
            crate::ContainerOptions::new().resolve_timeout(Duration::from_millis(50)),
        );
        let manager = Arc::new(ContainerControlledLifetime::new());
        let barrier = Arc::new(Barrier::new(2));

        let builder = {
            let container = container.clone();
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                with_cx(&container, |cx| {
                    assert!(manager.get_value(cx).unwrap().is_none());
                    barrier.wait();
                    thread::sleep(Duration::from_millis(200));
                    manager.recover(cx);
                })
            })
        };

        barrier.wait();
        let err = with_cx(&container, |cx| manager.get_value(cx)).unwrap_err();
        assert!(err.is_timeout());
        builder.join().unwrap();

        // released by recover, so the next caller builds
        assert!(with_cx(&container, |cx| manager.get_value(cx)).unwrap().is_none());
    }

    #[test]
    fn test_waiter_receives_value() {
        let container = Container::new();
        let manager = Arc::new(ContainerControlledLifetime::new());
        let barrier = Arc::new(Barrier::new(2));

        let builder = {
            let container = container.clone();
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                with_cx(&container, |cx| {
                    assert!(manager.get_value(cx).unwrap().is_none());
                    barrier.wait();
                    thread::sleep(Duration::from_millis(20));
                    manager.set_value(Value::from_owned(5u32), cx).unwrap();
                })
            })
        };

        barrier.wait();
        let value = with_cx(&container, |cx| manager.get_value(cx)).unwrap().unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 5);
        builder.join().unwrap();
    }

    #[test]
    fn test_external_holds_weakly() {
        let container = Container::new();
        let manager = ExternallyControlledLifetime::new();
        let instance = Arc::new(3u32);

        with_cx(&container, |cx| {
            assert!(manager.get_value(cx).unwrap().is_none());
            manager.set_value(Value::new(Arc::clone(&instance)), cx).unwrap();
            assert!(manager.try_get_value(cx).is_some());
        });

        drop(instance);
        with_cx(&container, |cx| assert!(manager.try_get_value(cx).is_none()));
    }

    #[test]
    fn test_per_resolve_is_operation_scoped() {
        let container = Container::new();
        let manager = PerResolveLifetime::new();

        with_cx(&container, |cx| {
            manager.set_value(Value::from_owned(1u8), cx).unwrap();
            assert!(manager.get_value(cx).unwrap().is_some());
        });
        with_cx(&container, |cx| assert!(manager.get_value(cx).unwrap().is_none()));
    }

    #[test]
    fn test_per_thread() {
        let container = Container::new();
        let manager = Arc::new(PerThreadLifetime::new());

        with_cx(&container, |cx| manager.set_value(Value::from_owned(1u8), cx).unwrap());

        let other = {
            let container = container.clone();
            let manager = Arc::clone(&manager);
            thread::spawn(move || with_cx(&container, |cx| manager.get_value(cx).unwrap().is_none()))
        };
        assert!(other.join().unwrap());
        assert!(with_cx(&container, |cx| manager.get_value(cx)).unwrap().is_some());
    }

    #[test]
    fn test_per_thread_value_dropped_with_thread() {
        let container = Container::new();
        let manager = Arc::new(PerThreadLifetime::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let container = container.clone();
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let instance = Arc::new(0u32);
                    let weak = Arc::downgrade(&instance);
                    with_cx(&container, |cx| {
                        manager.set_value(Value::new(instance), cx).unwrap();
                        assert!(manager.get_value(cx).unwrap().is_some());
                    });
                    weak
                })
            })
            .collect();

        for handle in handles {
            let weak = handle.join().unwrap();
            assert!(weak.upgrade().is_none());
        }
    }

    #[test]
    fn test_per_thread_managers_independent() {
        let container = Container::new();
        let first = PerThreadLifetime::new();
        let second = PerThreadLifetime::new();

        with_cx(&container, |cx| {
            first.set_value(Value::from_owned(1u8), cx).unwrap();
            assert!(second.get_value(cx).unwrap().is_none());
            first.remove_value(cx);
            assert!(first.get_value(cx).unwrap().is_none());
        });
    }

    #[test]
    fn test_container_transient_disposed_with_scope() {
        use std::sync::atomic::AtomicUsize;

        static DISPOSED: AtomicUsize = AtomicUsize::new(0);

        struct Handle;
        impl crate::Dispose for Handle {
            fn dispose(&self) {
                DISPOSED.fetch_add(1, Ordering::SeqCst);
            }
        }

        let container = Container::new();
        let manager = ContainerControlledTransientLifetime;
        with_cx(&container, |cx| {
            for _ in 0..3 {
                assert!(manager.get_value(cx).unwrap().is_none());
                let value = Value::from_owned(Handle)
                    .with_disposer(Some(crate::disposer_for::<Handle>()));
                manager.set_value(value, cx).unwrap();
            }
            // not disposable, nothing to track
            manager.set_value(Value::from_owned(0u8), cx).unwrap();
        });
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 0);

        container.dispose();
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_capabilities() {
        assert!(!Lifetime::Transient.manager().capabilities().instance);
        assert!(Lifetime::Singleton.manager().capabilities().instance);
        assert!(Lifetime::Hierarchical.manager().is_scope_sensitive());
        assert!(!Lifetime::Singleton.manager().is_scope_sensitive());
    }
}

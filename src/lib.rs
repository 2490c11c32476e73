//! # ioc-pipeline - Inversion of Control with Cacheable Resolution Pipelines
//!
//! A dependency injection container where every registration is resolved
//! through a memoized pipeline and cached (or not) by a pluggable lifetime
//! manager.
//!
//! ## Features
//!
//! - **Pipelines** - each registration gets a pipeline built once from the
//!   strategy chain and reused until the chain changes
//! - **Three pipeline builders** - iterated, compiled and curried, with
//!   identical short-circuit behavior
//! - **Seven lifetimes** - transient, singleton, hierarchical, per-resolve,
//!   per-thread, externally controlled and container-controlled transient
//! - **Child containers** - registrations are inherited, overridable and
//!   disposed with their scope
//! - **Generic patterns** - `Lazy<T>`, `Func<T>`, `Enumerable<T>` and
//!   `Vec<Arc<T>>` resolve without registration
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use ioc_pipeline::{resolvable, Construct, Container};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! impl Construct for UserService {
//!     type Dependencies = Arc<Database>;
//!
//!     fn create(db: Arc<Database>) -> Self {
//!         UserService { db }
//!     }
//! }
//!
//! resolvable!(Database);
//! resolvable!(construct UserService);
//!
//! let container = Container::new();
//! container
//!     .singleton(Database { url: "postgres://localhost".into() })
//!     .unwrap();
//!
//! // not registered: built from its constructor on demand
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Lifetimes
//!
//! ```rust
//! use ioc_pipeline::{resolvable, Construct, Container, Lifetime};
//! use std::sync::Arc;
//!
//! struct RequestState;
//!
//! impl Construct for RequestState {
//!     type Dependencies = ();
//!     fn create(_: ()) -> Self {
//!         RequestState
//!     }
//! }
//!
//! resolvable!(construct RequestState);
//!
//! let root = Container::new();
//! root.register::<RequestState>()
//!     .lifetime(Lifetime::Hierarchical)
//!     .to_self()
//!     .unwrap();
//!
//! let a = root.create_child_container();
//! let b = root.create_child_container();
//!
//! // one instance per child container
//! let first = a.resolve::<RequestState>().unwrap();
//! assert!(Arc::ptr_eq(&first, &a.resolve::<RequestState>().unwrap()));
//! assert!(!Arc::ptr_eq(&first, &b.resolve::<RequestState>().unwrap()));
//! ```
//!
//! ## Resolution
//!
//! Registered contracts run the registered algorithm: ask the lifetime
//! manager for a cached value, otherwise build or reuse the registration's
//! pipeline, run it and hand the result back to the lifetime manager.
//! Everything else runs the unregistered algorithm: a per-type pipeline
//! built from [`Resolvable::plan`]. Failures surface as
//! [`DiError::ResolutionFailed`] carrying the deepest cause.

mod config;
mod container;
mod context;
mod contract;
mod engine;
mod error;
mod factory;
mod generic;
mod inject;
mod lifetime;
#[cfg(feature = "logging")]
pub mod logging;
mod pipeline;
mod provider;
mod registration;
mod scope;
mod storage;
mod strategy;
mod value;

pub use config::*;
pub use container::*;
pub use context::ResolutionContext;
pub use contract::*;
pub use error::*;
pub use generic::*;
pub use inject::*;
pub use lifetime::*;
pub use pipeline::*;
pub use provider::*;
pub use registration::{
    Category, Converter, CreationPolicy, FactoryFn, RegistrationInfo, RegistrationManager,
};
pub use scope::ScopeId;
pub use strategy::*;
pub use value::*;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        resolvable, Construct, Container, ContainerOptions, DiError, Dispose, Enumerable, Func,
        InjectionMembers, Lazy, Lifetime, Resolvable, Result,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    // =========================================================================
    // Object graphs
    // =========================================================================

    struct TypeB;

    impl Construct for TypeB {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            TypeB
        }
    }

    struct TypeA {
        b: Arc<TypeB>,
    }

    impl Construct for TypeA {
        type Dependencies = Arc<TypeB>;
        fn create(b: Arc<TypeB>) -> Self {
            TypeA { b }
        }
    }

    resolvable!(construct TypeA, TypeB);

    #[test]
    fn test_transient_graph_is_fresh_each_time() {
        let container = Container::new();
        container.register::<TypeB>().to_self().unwrap();
        container.register::<TypeA>().to_self().unwrap();

        let first = container.resolve::<TypeA>().unwrap();
        let second = container.resolve::<TypeA>().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first.b, &second.b));
    }

    struct Widget;

    impl Construct for Widget {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Widget
        }
    }

    resolvable!(construct Widget);

    #[test]
    fn test_unregistered_type_is_constructed() {
        let container = Container::new();
        let a = container.resolve::<Widget>().unwrap();
        let b = container.resolve::<Widget>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!container.is_registered::<Widget>());
    }

    #[derive(Debug)]
    struct Chicken {
        _egg: Arc<Egg>,
    }

    #[derive(Debug)]
    struct Egg {
        _chicken: Arc<Chicken>,
    }

    impl Construct for Chicken {
        type Dependencies = Arc<Egg>;
        fn create(egg: Arc<Egg>) -> Self {
            Chicken { _egg: egg }
        }
    }

    impl Construct for Egg {
        type Dependencies = Arc<Chicken>;
        fn create(chicken: Arc<Chicken>) -> Self {
            Egg { _chicken: chicken }
        }
    }

    resolvable!(construct Chicken, Egg);

    #[test]
    fn test_circular_dependency_detected() {
        let container = Container::new();
        let err = container.resolve::<Chicken>().unwrap_err();
        assert!(matches!(err, DiError::ResolutionFailed { .. }));
        assert!(matches!(
            err.root_cause(),
            DiError::CircularDependency { .. }
        ));
    }

    struct Reporter {
        sink: Option<Arc<dyn Sink>>,
    }

    trait Sink: Send + Sync {}
    resolvable!(dyn Sink);

    impl Construct for Reporter {
        type Dependencies = Option<Arc<dyn Sink>>;
        fn create(sink: Option<Arc<dyn Sink>>) -> Self {
            Reporter { sink }
        }
    }

    resolvable!(construct Reporter);

    #[test]
    fn test_optional_dependency_missing() {
        let container = Container::new();
        let reporter = container.resolve::<Reporter>().unwrap();
        assert!(reporter.sink.is_none());
    }

    // =========================================================================
    // Singletons and synchronization
    // =========================================================================

    trait Foo: Send + Sync {
        fn id(&self) -> usize;
    }
    resolvable!(dyn Foo);

    static FOO_BUILT: AtomicUsize = AtomicUsize::new(0);

    struct SlowFoo(usize);

    impl Foo for SlowFoo {
        fn id(&self) -> usize {
            self.0
        }
    }

    impl Construct for SlowFoo {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            thread::sleep(Duration::from_millis(20));
            SlowFoo(FOO_BUILT.fetch_add(1, Ordering::SeqCst))
        }
    }

    resolvable!(construct SlowFoo);

    #[test]
    fn test_concurrent_singleton_built_once() {
        let container = Container::new();
        container
            .register::<dyn Foo>()
            .lifetime(Lifetime::Singleton)
            .to::<SlowFoo, _>(|foo| foo)
            .unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    container.resolve::<dyn Foo>().unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<dyn Foo>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for foo in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], foo));
        }
        assert_eq!(FOO_BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].id(), 0);
    }

    #[derive(Debug)]
    struct Flaky;
    resolvable!(Flaky);

    #[test]
    fn test_singleton_recovers_after_failed_build() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        let container = Container::with_options(
            ContainerOptions::new().resolve_timeout(Duration::from_millis(200)),
        );
        container
            .register::<Flaky>()
            .lifetime(Lifetime::Singleton)
            .factory(|_| {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DiError::creation_failed::<Flaky>("first attempt"))
                } else {
                    Ok(Arc::new(Flaky))
                }
            })
            .unwrap();

        let err = container.resolve::<Flaky>().unwrap_err();
        assert!(matches!(err.root_cause(), DiError::CreationFailed { .. }));

        let first = container.resolve::<Flaky>().unwrap();
        let second = container.resolve::<Flaky>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    struct Panicky;
    resolvable!(Panicky);

    #[test]
    fn test_singleton_recovers_after_panic() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        let container = Container::with_options(
            ContainerOptions::new().resolve_timeout(Duration::from_millis(200)),
        );
        container
            .register::<Panicky>()
            .lifetime(Lifetime::Singleton)
            .factory(|_| {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("constructor panicked");
                }
                Ok(Arc::new(Panicky))
            })
            .unwrap();

        let panicking = container.clone();
        assert!(thread::spawn(move || panicking.resolve::<Panicky>()).join().is_err());
        assert!(container.resolve::<Panicky>().is_ok());
    }

    #[derive(Debug)]
    struct Glacial;
    resolvable!(Glacial);

    #[test]
    fn test_waiting_thread_times_out() {
        let container = Container::with_options(
            ContainerOptions::new().resolve_timeout(Duration::from_millis(50)),
        );
        let (started, entered) = mpsc::channel();
        let started = Mutex::new(started);
        container
            .register::<Glacial>()
            .lifetime(Lifetime::Singleton)
            .factory(move |_| {
                let _ = started.lock().send(());
                thread::sleep(Duration::from_millis(400));
                Ok(Arc::new(Glacial))
            })
            .unwrap();

        let builder = container.clone();
        let handle = thread::spawn(move || builder.resolve::<Glacial>());
        entered.recv().unwrap();

        let err = container.resolve::<Glacial>().unwrap_err();
        assert!(err.is_timeout());

        assert!(handle.join().unwrap().is_ok());
        assert!(container.resolve::<Glacial>().is_ok());
    }

    // =========================================================================
    // Scoped lifetimes
    // =========================================================================

    static SESSIONS_CLOSED: AtomicUsize = AtomicUsize::new(0);

    struct Session;

    impl Construct for Session {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Session
        }
    }

    impl Dispose for Session {
        fn dispose(&self) {
            SESSIONS_CLOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    resolvable!(construct Session);

    #[test]
    fn test_hierarchical_isolation() {
        let root = Container::new();
        root.register::<Session>()
            .lifetime(Lifetime::Hierarchical)
            .disposable()
            .to_self()
            .unwrap();

        let a = root.create_child_container();
        let b = root.create_child_container();

        let in_a = a.resolve::<Session>().unwrap();
        let in_b = b.resolve::<Session>().unwrap();
        assert!(!Arc::ptr_eq(&in_a, &in_b));
        assert!(Arc::ptr_eq(&in_a, &a.resolve::<Session>().unwrap()));

        let closed = SESSIONS_CLOSED.load(Ordering::SeqCst);
        a.dispose();
        assert_eq!(SESSIONS_CLOSED.load(Ordering::SeqCst), closed + 1);
        assert!(Arc::ptr_eq(&in_b, &b.resolve::<Session>().unwrap()));
    }

    static SETTINGS_CLOSED: AtomicUsize = AtomicUsize::new(0);

    struct Settings(&'static str);

    impl Dispose for Settings {
        fn dispose(&self) {
            SETTINGS_CLOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    resolvable!(Settings);

    #[test]
    fn test_hierarchical_instance_shared_with_children() {
        let root = Container::new();
        let settings = Arc::new(Settings("shared"));
        root.register::<Settings>()
            .lifetime(Lifetime::Hierarchical)
            .disposable()
            .instance(Arc::clone(&settings))
            .unwrap();

        let child = root.create_child_container();
        let grandchild = child.create_child_container();
        assert!(Arc::ptr_eq(&root.resolve::<Settings>().unwrap(), &settings));
        assert!(Arc::ptr_eq(&child.resolve::<Settings>().unwrap(), &settings));
        assert_eq!(grandchild.resolve::<Settings>().unwrap().0, "shared");

        // only the registering scope disposes the instance
        grandchild.dispose();
        child.dispose();
        assert_eq!(SETTINGS_CLOSED.load(Ordering::SeqCst), 0);
        root.dispose();
        assert_eq!(SETTINGS_CLOSED.load(Ordering::SeqCst), 1);
    }

    static TICKETS_CLOSED: AtomicUsize = AtomicUsize::new(0);

    struct Ticket;

    impl Construct for Ticket {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Ticket
        }
    }

    impl Dispose for Ticket {
        fn dispose(&self) {
            TICKETS_CLOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    resolvable!(construct Ticket);

    #[test]
    fn test_container_transient_disposed_in_bulk() {
        let root = Container::new();
        let child = root.create_child_container();
        child
            .register::<Ticket>()
            .lifetime(Lifetime::ContainerTransient)
            .disposable()
            .to_self()
            .unwrap();

        let first = child.resolve::<Ticket>().unwrap();
        let second = child.resolve::<Ticket>().unwrap();
        child.resolve::<Ticket>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(TICKETS_CLOSED.load(Ordering::SeqCst), 0);

        child.dispose();
        assert_eq!(TICKETS_CLOSED.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_reregistration_reaches_child_scopes() {
        let root = Container::new();
        root.register::<dyn Part>()
            .lifetime(Lifetime::Hierarchical)
            .factory(|_| Ok(part("v1")))
            .unwrap();

        let child = root.create_child_container();
        assert_eq!(child.resolve::<dyn Part>().unwrap().label(), "v1");

        root.register::<dyn Part>()
            .lifetime(Lifetime::Hierarchical)
            .factory(|_| Ok(part("v2")))
            .unwrap();

        assert_eq!(root.resolve::<dyn Part>().unwrap().label(), "v2");
        assert_eq!(child.resolve::<dyn Part>().unwrap().label(), "v2");

        // the fresh copy still caches per scope
        assert!(Arc::ptr_eq(
            &child.resolve::<dyn Part>().unwrap(),
            &child.resolve::<dyn Part>().unwrap()
        ));
    }

    struct Unit;

    impl Construct for Unit {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Unit
        }
    }

    struct Pair {
        left: Arc<Unit>,
        right: Arc<Unit>,
    }

    impl Construct for Pair {
        type Dependencies = (Arc<Unit>, Arc<Unit>);
        fn create((left, right): (Arc<Unit>, Arc<Unit>)) -> Self {
            Pair { left, right }
        }
    }

    resolvable!(construct Unit, Pair);

    #[test]
    fn test_per_resolve_shared_within_graph() {
        let container = Container::new();
        container
            .register::<Unit>()
            .lifetime(Lifetime::PerResolve)
            .to_self()
            .unwrap();

        let first = container.resolve::<Pair>().unwrap();
        let second = container.resolve::<Pair>().unwrap();
        assert!(Arc::ptr_eq(&first.left, &first.right));
        assert!(!Arc::ptr_eq(&first.left, &second.left));
    }

    struct Gadget;

    impl Construct for Gadget {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Gadget
        }
    }

    resolvable!(construct Gadget);

    #[test]
    fn test_per_thread_instances() {
        let container = Container::new();
        container
            .register::<Gadget>()
            .lifetime(Lifetime::PerThread)
            .to_self()
            .unwrap();

        let x = container.resolve::<Gadget>().unwrap();
        let other = container.clone();
        let y = thread::spawn(move || other.resolve::<Gadget>().unwrap())
            .join()
            .unwrap();

        assert!(!Arc::ptr_eq(&x, &y));
        assert!(Arc::ptr_eq(&x, &container.resolve::<Gadget>().unwrap()));
    }

    #[test]
    fn test_external_lifetime_does_not_keep_value_alive() {
        let container = Container::new();
        container
            .register::<Widget>()
            .lifetime(Lifetime::External)
            .to_self()
            .unwrap();

        let held = container.resolve::<Widget>().unwrap();
        assert!(Arc::ptr_eq(&held, &container.resolve::<Widget>().unwrap()));

        drop(held);
        let rebuilt = container.resolve::<Widget>().unwrap();
        // only the caller holds the rebuilt value
        assert_eq!(Arc::strong_count(&rebuilt), 1);
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    trait Part: Send + Sync {
        fn label(&self) -> &str;
    }
    resolvable!(dyn Part);

    struct Labeled(&'static str);

    impl Part for Labeled {
        fn label(&self) -> &str {
            self.0
        }
    }

    fn part(label: &'static str) -> Arc<dyn Part> {
        Arc::new(Labeled(label))
    }

    #[test]
    fn test_resolve_all_in_registration_order() {
        let container = Container::new();
        for name in ["p1", "p2", "p3"] {
            container
                .register::<dyn Part>()
                .named(name)
                .instance(part(name))
                .unwrap();
        }

        let labels: Vec<_> = container
            .resolve_all::<dyn Part>()
            .unwrap()
            .iter()
            .map(|p| p.label().to_string())
            .collect();
        assert_eq!(labels, ["p1", "p2", "p3"]);
    }

    #[test]
    fn test_enumerable_empty_when_nothing_registered() {
        let container = Container::new();
        assert!(container.resolve_all::<dyn Part>().unwrap().is_empty());
    }

    #[test]
    fn test_enumerable_nearest_scope_wins() {
        let root = Container::new();
        root.register::<dyn Part>()
            .named("x")
            .instance(part("parent"))
            .unwrap();
        root.register::<dyn Part>()
            .named("y")
            .instance(part("shared"))
            .unwrap();

        let child = root.create_child_container();
        child
            .register::<dyn Part>()
            .named("x")
            .instance(part("child"))
            .unwrap();

        let labels: Vec<_> = child
            .resolve_all::<dyn Part>()
            .unwrap()
            .iter()
            .map(|p| p.label().to_string())
            .collect();
        assert_eq!(labels, ["child", "shared"]);
    }

    #[test]
    fn test_array_skips_default_registration() {
        let container = Container::new();
        container.register::<dyn Part>().instance(part("default")).unwrap();
        container
            .register::<dyn Part>()
            .named("extra")
            .instance(part("extra"))
            .unwrap();

        let all = container.resolve_all::<dyn Part>().unwrap();
        let named = container.resolve::<Vec<Arc<dyn Part>>>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].label(), "extra");
    }

    // =========================================================================
    // Strategy chain and pipeline builders
    // =========================================================================

    #[derive(Debug, Default)]
    struct CountBuilds(AtomicUsize);

    impl BuildStrategy for CountBuilds {
        fn hooks(&self) -> Hooks {
            Hooks::POST
        }

        fn post_build_up(&self, _ctx: &mut ResolutionContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_added_strategy_applies_to_cached_pipelines() {
        let container = Container::new();
        container.register::<TypeB>().to_self().unwrap();
        container.resolve::<TypeB>().unwrap();

        let counter = Arc::new(CountBuilds::default());
        container.add_strategy(Stage::PostInitialization, counter.clone());

        container.resolve::<TypeB>().unwrap();
        container.resolve::<Widget>().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shared_policy_builds_from_current_chain() {
        let container = Container::new();
        container
            .register::<TypeB>()
            .policy(CreationPolicy::Shared)
            .to_self()
            .unwrap();

        let first = container.resolve::<TypeB>().unwrap();
        let counter = Arc::new(CountBuilds::default());
        container.add_strategy(Stage::PostInitialization, counter.clone());

        let second = container.resolve::<TypeB>().unwrap();
        container.resolve::<TypeB>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        let info = container
            .registrations()
            .into_iter()
            .find(|info| info.contract == Contract::of::<TypeB>())
            .unwrap();
        assert_eq!(info.category, "Type");
    }

    #[test]
    fn test_pipeline_kinds_agree() {
        for kind in [
            PipelineKind::Iterated,
            PipelineKind::Compiled,
            PipelineKind::Resolved,
        ] {
            let container = Container::with_options(ContainerOptions::new().pipeline_kind(kind));
            container
                .register::<Unit>()
                .lifetime(Lifetime::Singleton)
                .to_self()
                .unwrap();

            let pair = container.resolve::<Pair>().unwrap();
            assert!(Arc::ptr_eq(&pair.left, &pair.right), "{kind:?}");

            let err = container.resolve::<Chicken>().unwrap_err();
            assert!(
                matches!(err.root_cause(), DiError::CircularDependency { .. }),
                "{kind:?}"
            );
        }
    }

    // =========================================================================
    // Generic patterns through the container
    // =========================================================================

    #[test]
    fn test_lazy_defers_construction() {
        let container = Container::new();
        container
            .register::<dyn Part>()
            .factory(|_| Ok(part("lazy")))
            .unwrap();

        let lazy = container.resolve::<Lazy<dyn Part>>().unwrap();
        assert!(!lazy.is_created());
        assert_eq!(lazy.value().unwrap().label(), "lazy");
        assert!(lazy.is_created());
    }

    #[test]
    fn test_child_override_does_not_leak_to_parent() {
        let root = Container::new();
        root.register::<dyn Part>().instance(part("production")).unwrap();

        let child = root.create_child_container();
        child.register::<dyn Part>().instance(part("test")).unwrap();

        assert_eq!(root.resolve::<dyn Part>().unwrap().label(), "production");
        assert_eq!(child.resolve::<dyn Part>().unwrap().label(), "test");
    }

    const BOX: Definition = Definition::new("Box");

    struct Boxed<T>(&'static str, std::marker::PhantomData<fn() -> T>);

    impl<T: Send + Sync + 'static> Resolvable for Boxed<T> {
        fn definition() -> Option<Definition> {
            Some(BOX)
        }
    }

    fn boxed(label: &'static str) -> Value {
        Value::from_owned(Boxed::<u32>(label, std::marker::PhantomData))
    }

    #[test]
    fn test_reregistered_generic_is_closed_again() {
        let root = Container::new();
        root.register_generic(BOX)
            .lifetime(Lifetime::Singleton)
            .factory(|_, _| Ok(boxed("v1")))
            .unwrap();

        let child = root.create_child_container();
        let first = child.resolve::<Boxed<u32>>().unwrap();
        assert_eq!(first.0, "v1");
        assert!(Arc::ptr_eq(&first, &root.resolve::<Boxed<u32>>().unwrap()));

        root.register_generic(BOX)
            .factory(|_, _| Ok(boxed("v2")))
            .unwrap();

        assert_eq!(root.resolve::<Boxed<u32>>().unwrap().0, "v2");
        assert_eq!(child.resolve::<Boxed<u32>>().unwrap().0, "v2");
    }
}

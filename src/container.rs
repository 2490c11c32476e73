//! The container handle and registration builders
//!
//! A [`Container`] is a cheap, cloneable handle to one scope. Child
//! containers share the root's engine (strategy chain, cached pipelines
//! for unregistered types) and see every registration of their ancestors.

use crate::context::Operation;
use crate::engine::{Engine, OperationGuard};
use crate::lifetime::{Lifetime, LifetimeContext, LifetimeManager};
use crate::registration::{
    Category, Converter, CreationPolicy, FactoryFn, RegistrationInfo, RegistrationManager,
};
use crate::scope::{Scope, ScopeId};
use crate::strategy::{BuildStrategy, Stage};
use crate::{
    disposer_for, Construct, ContainerOptions, Contract, Definition, DiError, Dispose, Disposer,
    Enumerable, InjectionMembers, Plan, Recipe, ResolutionContext, Resolvable, Result, TypeKey,
    Value,
};
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::debug;

/// Inversion-of-control container.
///
/// # Examples
///
/// ```rust
/// use ioc_pipeline::{resolvable, Construct, Container, Lifetime};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// impl Construct for English {
///     type Dependencies = ();
///     fn create(_: ()) -> Self {
///         English
///     }
/// }
///
/// resolvable!(dyn Greeter);
///
/// let container = Container::new();
/// container
///     .register::<dyn Greeter>()
///     .lifetime(Lifetime::Singleton)
///     .to::<English, _>(|english| english)
///     .unwrap();
///
/// let a = container.resolve::<dyn Greeter>().unwrap();
/// let b = container.resolve::<dyn Greeter>().unwrap();
/// assert_eq!(a.greet(), "hello");
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Container {
    scope: Arc<Scope>,
}

impl Container {
    /// Create a new root container with default options.
    #[inline]
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// Create a new root container.
    pub fn with_options(options: ContainerOptions) -> Self {
        let engine = Arc::new(Engine::new(options));
        Self {
            scope: Arc::new(Scope::root(engine)),
        }
    }

    /// Create a child container.
    ///
    /// The child resolves everything its ancestors have registered, may
    /// override registrations locally, and gets its own values for
    /// [`Lifetime::Hierarchical`] registrations.
    pub fn create_child_container(&self) -> Self {
        Self {
            scope: Arc::new(Scope::child(&self.scope)),
        }
    }

    #[inline]
    pub(crate) fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Options shared with every scope of this container tree
    #[inline]
    pub fn options(&self) -> &ContainerOptions {
        self.scope.options()
    }

    /// Scope identifier
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.scope.id()
    }

    /// Number of ancestors, `0` for a root container
    #[inline]
    pub fn depth(&self) -> u32 {
        self.scope.depth()
    }

    /// Weak handle that does not keep the scope alive
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            scope: Arc::downgrade(&self.scope),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Start a registration for contract type `S`.
    ///
    /// Finish it with [`to_self`](RegistrationBuilder::to_self),
    /// [`to`](RegistrationBuilder::to),
    /// [`instance`](RegistrationBuilder::instance) or
    /// [`factory`](RegistrationBuilder::factory).
    pub fn register<S: ?Sized + Resolvable>(&self) -> RegistrationBuilder<'_, S> {
        RegistrationBuilder {
            container: self,
            name: None,
            lifetime: None,
            policy: CreationPolicy::Any,
            disposer: None,
            _marker: PhantomData,
        }
    }

    /// Register a pre-built value as a singleton.
    pub fn singleton<T: Resolvable>(&self, instance: T) -> Result<()> {
        self.register::<T>().instance(Arc::new(instance))
    }

    /// Start a registration that applies to every closed type of `definition`
    pub fn register_generic(&self, definition: Definition) -> GenericRegistrationBuilder<'_> {
        GenericRegistrationBuilder {
            container: self,
            definition,
            name: None,
            lifetime: None,
            disposer: None,
        }
    }

    /// Append a build strategy to `stage`.
    ///
    /// Pipelines built before the change are rebuilt on their next use.
    pub fn add_strategy(&self, stage: Stage, strategy: Arc<dyn BuildStrategy>) {
        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_pipeline",
            stage = ?stage,
            strategy = ?strategy,
            "Adding build strategy"
        );

        self.scope.engine().add_strategy(stage, strategy);
    }

    fn add(&self, manager: RegistrationManager) -> Result<()> {
        let capabilities = manager.lifetime().capabilities();
        let supported = match manager.category() {
            Category::Instance(_) => capabilities.instance,
            Category::Type { .. } => capabilities.types,
            Category::Factory(_) => capabilities.factory,
            _ => true,
        };
        if !supported {
            return Err(DiError::InvalidLifetime {
                lifetime: manager.lifetime().name(),
                category: manager.category().name(),
            });
        }
        self.scope.register(manager)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `T`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ioc_pipeline::{resolvable, Container};
    ///
    /// struct Port(u16);
    /// resolvable!(Port);
    ///
    /// let container = Container::new();
    /// container.singleton(Port(8080)).unwrap();
    /// assert_eq!(container.resolve::<Port>().unwrap().0, 8080);
    /// ```
    pub fn resolve<T: ?Sized + Resolvable>(&self) -> Result<Arc<T>> {
        self.resolve_contract(Contract::of::<T>(), T::plan)?
            .downcast::<T>()
            .ok_or_else(DiError::type_mismatch::<T>)
    }

    /// Resolve the registration of `T` named `name`
    pub fn resolve_named<T: ?Sized + Resolvable>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_contract(Contract::named::<T>(name), T::plan)?
            .downcast::<T>()
            .ok_or_else(DiError::type_mismatch::<T>)
    }

    /// Resolve `T`, discarding the error
    #[inline]
    pub fn try_resolve<T: ?Sized + Resolvable>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().ok()
    }

    /// Resolve every registration of `T`, including the default one
    pub fn resolve_all<T: ?Sized + Resolvable>(&self) -> Result<Vec<Arc<T>>> {
        Ok(self.resolve::<Enumerable<T>>()?.to_vec())
    }

    /// Resolve an arbitrary contract as a new top-level operation.
    ///
    /// Failures are reported as [`DiError::ResolutionFailed`] for
    /// `contract`, carrying the original cause.
    pub fn resolve_contract(&self, contract: Contract, plan: fn() -> Plan) -> Result<Value> {
        if self.scope.is_disposed() {
            return Err(DiError::aggregate(&contract, DiError::ContainerDisposed));
        }

        let max_depth = self.options().max_depth;
        let Some(_guard) = OperationGuard::enter(max_depth) else {
            let cause = DiError::DepthExceeded {
                contract: contract.to_string(),
                depth: max_depth,
            };
            return Err(DiError::aggregate(&contract, cause));
        };

        let operation = Operation::new();
        let mut ctx = ResolutionContext::root(self, &operation, contract, plan);
        let value = self.scope.engine().resolve(&mut ctx);

        match ctx.take_error() {
            Some(cause) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "ioc_pipeline",
                    contract = %ctx.contract(),
                    error = %cause,
                    "Resolution failed"
                );
                Err(DiError::aggregate(ctx.contract(), cause))
            }
            None => value.ok_or_else(|| DiError::not_found(ctx.contract())),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether `T` has a registration here or in an ancestor
    pub fn is_registered<T: ?Sized + Resolvable>(&self) -> bool {
        self.scope.is_registered(&Contract::of::<T>())
    }

    /// Whether `T` has a registration named `name` here or in an ancestor
    pub fn is_registered_named<T: ?Sized + Resolvable>(&self, name: &str) -> bool {
        self.scope.is_registered(&Contract::named::<T>(name))
    }

    /// Whether resolving `T` could succeed without attempting it
    pub fn can_resolve<T: ?Sized + Resolvable>(&self) -> bool {
        self.is_registered::<T>() || T::plan().is_resolvable()
    }

    /// Whether resolving `T` named `name` could succeed without attempting it.
    ///
    /// Named contracts are built from their type's plan like unnamed ones,
    /// so this only differs from [`can_resolve`](Self::can_resolve) for
    /// types that need a registration.
    pub fn can_resolve_named<T: ?Sized + Resolvable>(&self, name: &str) -> bool {
        self.is_registered_named::<T>(name) || T::plan().is_resolvable()
    }

    /// Registrations visible from this container, nearest first
    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let operation = Operation::new();
        self.scope
            .registrations()
            .into_iter()
            .map(|manager| {
                let contract = manager.contract().clone();
                let cx = LifetimeContext::new(&self.scope, &operation, &contract);
                let cached = manager.lifetime().try_get_value(&cx).is_some();
                RegistrationInfo {
                    category: manager.category().name(),
                    lifetime: manager.lifetime().name(),
                    cached,
                    contract,
                }
            })
            .collect()
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Dispose this scope: deferred values and callbacks newest first,
    /// then every registration's lifetime manager.
    ///
    /// Further registrations and resolutions fail with
    /// [`DiError::ContainerDisposed`]. Child containers are not affected.
    pub fn dispose(&self) {
        self.scope.dispose();
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.scope.id())
            .field("depth", &self.scope.depth())
            .field("disposed", &self.scope.is_disposed())
            .finish()
    }
}

impl Resolvable for Container {}

/// Non-owning container handle
#[derive(Clone)]
pub struct WeakContainer {
    scope: Weak<Scope>,
}

impl WeakContainer {
    /// Upgrade if the scope is still alive
    pub fn upgrade(&self) -> Option<Container> {
        self.scope.upgrade().map(|scope| Container { scope })
    }
}

impl fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.scope.strong_count() > 0))
            .finish()
    }
}

// =============================================================================
// Registration builder
// =============================================================================

/// Describes one registration of contract type `S`.
#[must_use = "a registration takes effect only once finished"]
pub struct RegistrationBuilder<'c, S: ?Sized> {
    container: &'c Container,
    name: Option<String>,
    lifetime: Option<Box<dyn LifetimeManager>>,
    policy: CreationPolicy,
    disposer: Option<Disposer>,
    _marker: PhantomData<fn() -> Box<S>>,
}

impl<S: ?Sized + Resolvable> RegistrationBuilder<'_, S> {
    /// Register under a name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use a built-in lifetime
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime.manager());
        self
    }

    /// Use a custom lifetime manager
    pub fn manager(mut self, manager: Box<dyn LifetimeManager>) -> Self {
        self.lifetime = Some(manager);
        self
    }

    /// Set how the build pipeline is shared
    pub fn policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Call [`Dispose::dispose`] on values when their owner is disposed
    pub fn disposable(mut self) -> Self
    where
        S: Dispose,
    {
        self.disposer = Some(disposer_for::<S>());
        self
    }

    /// Build `S` itself through the strategy chain. Defaults to transient.
    pub fn to_self(self) -> Result<()>
    where
        S: Construct,
    {
        self.to_self_with(InjectionMembers::new())
    }

    /// Build `S` itself with extra injection members
    pub fn to_self_with(self, members: InjectionMembers<S>) -> Result<()>
    where
        S: Construct,
    {
        let require_build = !members.is_empty();
        let category = Category::Type {
            implementation: TypeKey::of_type::<S>(),
            recipe: Arc::new(Recipe::with_members::<S>(members)),
            plan: Plan::construct::<S>,
            convert: None,
            require_build,
        };
        self.finish(category, Lifetime::Transient)
    }

    /// Map `S` to implementation `I`. Defaults to transient.
    ///
    /// `I` is resolved under the same name, so a separate registration of
    /// `I` (and its lifetime) is honored.
    pub fn to<I, F>(self, upcast: F) -> Result<()>
    where
        I: Construct,
        F: Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    {
        self.to_with(InjectionMembers::new(), upcast)
    }

    /// Map `S` to implementation `I`, built directly with extra members
    pub fn to_with<I, F>(self, members: InjectionMembers<I>, upcast: F) -> Result<()>
    where
        I: Construct,
        F: Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    {
        let require_build = !members.is_empty();
        let convert: Option<Converter> = if TypeId::of::<I>() == TypeId::of::<S>() {
            None
        } else {
            Some(Arc::new(move |value: Value| {
                value.downcast::<I>().map(|built| Value::new(upcast(built)))
            }))
        };

        let category = Category::Type {
            implementation: TypeKey::of_type::<I>(),
            recipe: Arc::new(Recipe::with_members::<I>(members)),
            plan: Plan::construct::<I>,
            convert,
            require_build,
        };
        self.finish(category, Lifetime::Transient)
    }

    /// Register a pre-built value. Defaults to [`Lifetime::Singleton`].
    pub fn instance(mut self, instance: Arc<S>) -> Result<()> {
        let lifetime = self
            .lifetime
            .take()
            .unwrap_or_else(|| Lifetime::Singleton.manager());
        let contract = self.contract();
        let value = Value::new(instance);
        // child scopes reach the instance through the category and never dispose it
        let category = Category::Instance(value.downgrade());

        let scope = self.container.scope();
        let operation = Operation::new();
        let cx = LifetimeContext::new(scope, &operation, &contract);
        if lifetime.capabilities().instance {
            lifetime.set_value(value.with_disposer(self.disposer), &cx)?;
        }

        let manager = RegistrationManager::new(
            contract.clone(),
            category,
            lifetime,
            self.policy,
            None,
            scope.engine().next_order(),
        );
        self.container.add(manager)
    }

    /// Produce values with a delegate. Defaults to transient.
    pub fn factory<F>(self, factory: F) -> Result<()>
    where
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        let delegate: FactoryFn =
            Arc::new(move |container: &Container, _: &Contract| factory(container).map(Value::new));
        self.finish(Category::Factory(delegate), Lifetime::Transient)
    }

    fn contract(&self) -> Contract {
        Contract::new(TypeKey::of::<S>(), self.name.as_deref())
    }

    fn finish(self, category: Category, default: Lifetime) -> Result<()> {
        let contract = self.contract();
        let lifetime = self.lifetime.unwrap_or_else(|| default.manager());
        let manager = RegistrationManager::new(
            contract,
            category,
            lifetime,
            self.policy,
            self.disposer,
            self.container.scope().engine().next_order(),
        );
        self.container.add(manager)
    }
}

/// Describes a registration for every closed type of a generic definition.
///
/// ```rust
/// use ioc_pipeline::{Container, Definition, DiError, Resolvable, Value};
/// use std::marker::PhantomData;
///
/// const REPO: Definition = Definition::new("Repo");
///
/// struct Repo<T>(PhantomData<fn() -> T>);
///
/// impl<T: Send + Sync + 'static> Resolvable for Repo<T> {
///     fn definition() -> Option<Definition> {
///         Some(REPO)
///     }
/// }
///
/// let container = Container::new();
/// container
///     .register_generic(REPO)
///     .factory(|_, contract| {
///         if contract.key().is::<Repo<u32>>() {
///             Ok(Value::from_owned(Repo::<u32>(PhantomData)))
///         } else {
///             Err(DiError::GenericArgument {
///                 definition: "Repo",
///                 argument: contract.key().name(),
///             })
///         }
///     })
///     .unwrap();
///
/// assert!(container.resolve::<Repo<u32>>().is_ok());
/// assert!(container.resolve::<Repo<String>>().is_err());
/// ```
#[must_use = "a registration takes effect only once finished"]
pub struct GenericRegistrationBuilder<'c> {
    container: &'c Container,
    definition: Definition,
    name: Option<String>,
    lifetime: Option<Box<dyn LifetimeManager>>,
    disposer: Option<Disposer>,
}

impl GenericRegistrationBuilder<'_> {
    /// Register under a name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lifetime used by each closed type; every closed type gets its own
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime.manager());
        self
    }

    /// Custom lifetime manager, cloned for each closed type
    pub fn manager(mut self, manager: Box<dyn LifetimeManager>) -> Self {
        self.lifetime = Some(manager);
        self
    }

    /// Disposal hook applied to produced values
    pub fn disposer(mut self, disposer: Disposer) -> Self {
        self.disposer = Some(disposer);
        self
    }

    /// Produce values for the closed contract.
    ///
    /// Return [`DiError::GenericArgument`] for closed types the delegate
    /// does not support; enumerations skip those.
    pub fn factory<F>(self, factory: F) -> Result<()>
    where
        F: Fn(&Container, &Contract) -> Result<Value> + Send + Sync + 'static,
    {
        let contract = Contract::new(TypeKey::open(self.definition), self.name.as_deref());
        let lifetime = self
            .lifetime
            .unwrap_or_else(|| Lifetime::Transient.manager());
        let manager = RegistrationManager::new(
            contract,
            Category::Factory(Arc::new(factory)),
            lifetime,
            CreationPolicy::Any,
            self.disposer,
            self.container.scope().engine().next_order(),
        );
        self.container.add(manager)
    }
}

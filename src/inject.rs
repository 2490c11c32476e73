//! Construction recipes and member injection
//!
//! A type opts into container construction by implementing [`Construct`]:
//! it declares its constructor dependencies as an associated type and
//! builds itself from them. Field, property and method injection are
//! described by [`InjectionMembers`], either on the type itself or on a
//! registration.
//!
//! # Example
//!
//! ```rust
//! use ioc_pipeline::{resolvable, Construct, Container, InjectionMembers};
//! use std::sync::Arc;
//!
//! struct Config {
//!     debug: bool,
//! }
//!
//! impl Construct for Config {
//!     type Dependencies = ();
//!     fn create(_: ()) -> Self {
//!         Config { debug: true }
//!     }
//! }
//!
//! struct Service {
//!     config: Arc<Config>,
//!     label: Option<String>,
//! }
//!
//! impl Construct for Service {
//!     type Dependencies = Arc<Config>;
//!     fn create(config: Arc<Config>) -> Self {
//!         Service { config, label: None }
//!     }
//!
//!     fn members() -> InjectionMembers<Self> {
//!         InjectionMembers::new().property(|svc: &mut Service, config: Arc<Config>| {
//!             svc.label = Some(format!("debug={}", config.debug));
//!         })
//!     }
//! }
//!
//! resolvable!(construct Config, Service);
//!
//! let container = Container::new();
//! let svc = container.resolve::<Service>().unwrap();
//! assert!(svc.config.debug);
//! assert_eq!(svc.label.as_deref(), Some("debug=true"));
//! ```

use crate::{Contract, DiError, ResolutionContext, Resolvable, Result, TypeKey, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Object under construction, before it is sealed into a [`Value`]
pub type Building = Box<dyn Any + Send + Sync>;

// =============================================================================
// Construct Trait
// =============================================================================

/// A type the container can build itself.
///
/// `Dependencies` lists what the constructor needs; the container resolves
/// it (recursively, through the same pipelines) and hands it to
/// [`Construct::create`].
///
/// # Supported Dependency Types
///
/// - `()` - No dependencies
/// - `Arc<T>` - Single required dependency
/// - `Option<Arc<T>>` - Optional dependency, `None` when `T` is not resolvable
/// - Tuples of the above, up to 12 elements
pub trait Construct: Send + Sync + Sized + 'static {
    /// Constructor parameters
    type Dependencies: Dependencies;

    /// Build the instance from its resolved dependencies
    fn create(deps: Self::Dependencies) -> Self;

    /// Members injected after construction
    fn members() -> InjectionMembers<Self> {
        InjectionMembers::new()
    }
}

// =============================================================================
// Dependencies Trait
// =============================================================================

/// Something that can be resolved from an in-flight resolution.
///
/// Resolving a dependency creates a child context, so cycles and depth
/// limits are tracked across the whole object graph.
pub trait Dependencies: Sized {
    /// Resolve from the current context
    fn resolve(ctx: &mut ResolutionContext<'_>) -> Result<Self>;
}

impl Dependencies for () {
    #[inline]
    fn resolve(_ctx: &mut ResolutionContext<'_>) -> Result<Self> {
        Ok(())
    }
}

impl<T: ?Sized + Resolvable> Dependencies for Arc<T> {
    #[inline]
    fn resolve(ctx: &mut ResolutionContext<'_>) -> Result<Self> {
        ctx.resolve::<T>()
    }
}

impl<T: ?Sized + Resolvable> Dependencies for Option<Arc<T>> {
    fn resolve(ctx: &mut ResolutionContext<'_>) -> Result<Self> {
        match ctx.resolve::<T>() {
            Ok(dep) => Ok(Some(dep)),
            Err(DiError::NotFound { contract }) if contract == Contract::of::<T>().to_string() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Dependencies),+> Dependencies for ($($T,)+) {
            #[inline]
            fn resolve(ctx: &mut ResolutionContext<'_>) -> Result<Self> {
                Ok(($($T::resolve(ctx)?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A);
impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

// =============================================================================
// Injection Members
// =============================================================================

/// Which injection pass a member belongs to.
///
/// Passes run in declaration order: fields, then properties, then methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Method,
}

type Constructor<T> = Arc<dyn Fn(&mut ResolutionContext<'_>) -> Result<T> + Send + Sync>;
type Injector<T> = Arc<dyn Fn(&mut T, &mut ResolutionContext<'_>) -> Result<()> + Send + Sync>;

/// Constructor override and post-construction injectors for `T`.
pub struct InjectionMembers<T> {
    constructor: Option<Constructor<T>>,
    fields: Vec<Injector<T>>,
    properties: Vec<Injector<T>>,
    methods: Vec<Injector<T>>,
}

impl<T: Send + Sync + 'static> InjectionMembers<T> {
    /// No overrides
    pub fn new() -> Self {
        Self {
            constructor: None,
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Replace the default constructor
    pub fn constructor<D, F>(mut self, create: F) -> Self
    where
        D: Dependencies + 'static,
        F: Fn(D) -> T + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(move |ctx: &mut ResolutionContext<'_>| {
            Ok(create(D::resolve(ctx)?))
        }));
        self
    }

    /// Replace the default constructor with one driving the context directly
    pub fn constructor_with<F>(mut self, create: F) -> Self
    where
        F: Fn(&mut ResolutionContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(create));
        self
    }

    /// Inject a field after construction
    pub fn field<D, F>(self, inject: F) -> Self
    where
        D: Dependencies + 'static,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        self.push(MemberKind::Field, typed_injector(inject))
    }

    /// Inject a property after fields
    pub fn property<D, F>(self, inject: F) -> Self
    where
        D: Dependencies + 'static,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        self.push(MemberKind::Property, typed_injector(inject))
    }

    /// Call an initialization method after properties
    pub fn method<D, F>(self, call: F) -> Self
    where
        D: Dependencies + 'static,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        self.push(MemberKind::Method, typed_injector(call))
    }

    /// Add an injector that can fail or resolve dynamically
    pub fn inject_with<F>(self, kind: MemberKind, inject: F) -> Self
    where
        F: Fn(&mut T, &mut ResolutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.push(kind, Arc::new(inject))
    }

    fn push(mut self, kind: MemberKind, injector: Injector<T>) -> Self {
        match kind {
            MemberKind::Field => self.fields.push(injector),
            MemberKind::Property => self.properties.push(injector),
            MemberKind::Method => self.methods.push(injector),
        }
        self
    }

    /// Layer `other` on top: its constructor wins, its injectors run after ours
    pub fn merge(mut self, other: InjectionMembers<T>) -> Self {
        if other.constructor.is_some() {
            self.constructor = other.constructor;
        }
        self.fields.extend(other.fields);
        self.properties.extend(other.properties);
        self.methods.extend(other.methods);
        self
    }

    /// Whether nothing is overridden or injected
    pub fn is_empty(&self) -> bool {
        self.constructor.is_none()
            && self.fields.is_empty()
            && self.properties.is_empty()
            && self.methods.is_empty()
    }
}

impl<T: Send + Sync + 'static> Default for InjectionMembers<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn typed_injector<T, D, F>(inject: F) -> Injector<T>
where
    T: Send + Sync + 'static,
    D: Dependencies + 'static,
    F: Fn(&mut T, D) + Send + Sync + 'static,
{
    Arc::new(move |target: &mut T, ctx: &mut ResolutionContext<'_>| {
        let deps = D::resolve(ctx)?;
        inject(target, deps);
        Ok(())
    })
}

// =============================================================================
// Recipe
// =============================================================================

type ErasedConstructor = Arc<dyn Fn(&mut ResolutionContext<'_>) -> Result<Building> + Send + Sync>;
type ErasedInjector =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &mut ResolutionContext<'_>) -> Result<()> + Send + Sync>;

/// Type-erased description of how to build one concrete type.
///
/// Recipes are what build strategies consume: the constructor strategy
/// calls [`Recipe::construct`], the member strategies run the matching
/// injectors against the object under construction.
pub struct Recipe {
    key: TypeKey,
    construct: ErasedConstructor,
    fields: Vec<ErasedInjector>,
    properties: Vec<ErasedInjector>,
    methods: Vec<ErasedInjector>,
    seal: fn(Building) -> Option<Value>,
}

impl Recipe {
    /// Recipe from `T`'s own [`Construct`] implementation
    pub fn of<T: Construct>() -> Self {
        Self::with_members::<T>(InjectionMembers::new())
    }

    /// Recipe with registration-supplied members layered over `T::members()`
    pub fn with_members<T: Construct>(members: InjectionMembers<T>) -> Self {
        let InjectionMembers {
            constructor,
            fields,
            properties,
            methods,
        } = T::members().merge(members);

        let construct: ErasedConstructor = match constructor {
            Some(create) => Arc::new(move |ctx: &mut ResolutionContext<'_>| {
                create(ctx).map(|obj| Box::new(obj) as Building)
            }),
            None => Arc::new(|ctx: &mut ResolutionContext<'_>| {
                let deps = T::Dependencies::resolve(ctx)?;
                Ok(Box::new(T::create(deps)) as Building)
            }),
        };

        Self {
            key: TypeKey::of_type::<T>(),
            construct,
            fields: fields.into_iter().map(erase_injector).collect(),
            properties: properties.into_iter().map(erase_injector).collect(),
            methods: methods.into_iter().map(erase_injector).collect(),
            seal: seal::<T>,
        }
    }

    /// Concrete type built by this recipe
    #[inline]
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Run the constructor
    pub fn construct(&self, ctx: &mut ResolutionContext<'_>) -> Result<Building> {
        (self.construct)(ctx)
    }

    /// Run one injection pass over the object under construction
    pub fn inject(
        &self,
        kind: MemberKind,
        target: &mut (dyn Any + Send + Sync),
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<()> {
        for injector in self.injectors(kind) {
            injector(target, ctx)?;
        }
        Ok(())
    }

    /// Whether any injector exists for the pass
    #[inline]
    pub fn has_members(&self, kind: MemberKind) -> bool {
        !self.injectors(kind).is_empty()
    }

    /// Turn the finished object into a shareable value
    #[inline]
    pub fn seal(&self, obj: Building) -> Option<Value> {
        (self.seal)(obj)
    }

    fn injectors(&self, kind: MemberKind) -> &[ErasedInjector] {
        match kind {
            MemberKind::Field => &self.fields,
            MemberKind::Property => &self.properties,
            MemberKind::Method => &self.methods,
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("type", &self.key.name())
            .field("fields", &self.fields.len())
            .field("properties", &self.properties.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

fn erase_injector<T: Send + Sync + 'static>(injector: Injector<T>) -> ErasedInjector {
    Arc::new(move |target: &mut (dyn Any + Send + Sync), ctx: &mut ResolutionContext<'_>| {
        let target = target
            .downcast_mut::<T>()
            .ok_or_else(DiError::type_mismatch::<T>)?;
        injector(target, ctx)
    })
}

fn seal<T: Send + Sync + 'static>(obj: Building) -> Option<Value> {
    obj.downcast::<T>().ok().map(|obj| Value::new(Arc::<T>::from(obj)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolvable, Container};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Config {
        port: u16,
    }

    impl Construct for Config {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Config { port: 8080 }
        }
    }

    trait Metrics: Send + Sync {}
    resolvable!(dyn Metrics);

    struct Server {
        config: Arc<Config>,
        metrics: Option<Arc<dyn Metrics>>,
        steps: Vec<&'static str>,
    }

    impl Construct for Server {
        type Dependencies = (Arc<Config>, Option<Arc<dyn Metrics>>);
        fn create((config, metrics): Self::Dependencies) -> Self {
            Server {
                config,
                metrics,
                steps: vec!["ctor"],
            }
        }
    }

    resolvable!(construct Config, Server);

    #[test]
    fn test_constructor_dependencies() {
        let container = Container::new();
        let server = container.resolve::<Server>().unwrap();
        assert_eq!(server.config.port, 8080);
        assert!(server.metrics.is_none());
    }

    #[test]
    fn test_member_passes_run_in_order() {
        let container = Container::new();
        let members = InjectionMembers::<Server>::new()
            .method(|s: &mut Server, ()| s.steps.push("method"))
            .property(|s: &mut Server, ()| s.steps.push("property"))
            .field(|s: &mut Server, _: Arc<Config>| s.steps.push("field"));

        container
            .register::<Server>()
            .to_self_with(members)
            .unwrap();

        let server = container.resolve::<Server>().unwrap();
        assert_eq!(server.steps, vec!["ctor", "field", "property", "method"]);
    }

    #[test]
    fn test_constructor_override() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let container = Container::new();
        let members = InjectionMembers::<Config>::new().constructor(|()| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Config { port: 9090 }
        });
        container
            .register::<Config>()
            .to_self_with(members)
            .unwrap();

        assert_eq!(container.resolve::<Config>().unwrap().port, 9090);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_injector_faults_resolution() {
        let container = Container::new();
        let members = InjectionMembers::<Config>::new().inject_with(MemberKind::Method, |_, _| {
            Err(DiError::creation_failed::<Config>("refused"))
        });
        container
            .register::<Config>()
            .to_self_with(members)
            .unwrap();

        let err = container.resolve::<Config>().unwrap_err();
        assert!(matches!(err.root_cause(), DiError::CreationFailed { .. }));
    }

    #[test]
    fn test_recipe_members() {
        let recipe = Recipe::with_members::<Config>(
            InjectionMembers::new().field(|c: &mut Config, ()| c.port += 1),
        );
        assert!(recipe.has_members(MemberKind::Field));
        assert!(!recipe.has_members(MemberKind::Method));
        assert!(recipe.key().is::<Config>());
    }
}

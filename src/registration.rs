//! Registrations: what a contract maps to and how its value is cached

use crate::lifetime::LifetimeManager;
use crate::pipeline::Pipeline;
use crate::{Container, Contract, Disposer, Plan, Recipe, Result, TypeKey, Value, WeakValue};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::trace;

/// User delegate behind a factory registration
pub type FactoryFn = Arc<dyn Fn(&Container, &Contract) -> Result<Value> + Send + Sync>;

/// Conversion from an implementation value to the registered contract type
pub type Converter = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// How a type registration's build pipeline is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CreationPolicy {
    /// Build once, cache the pipeline on the registration
    #[default]
    Any,
    /// Rebuild from the current strategy chain on every resolve
    Shared,
    /// Dedicated pipeline owned by the registration
    NonShared,
}

/// What a registration resolves to.
pub enum Category {
    /// Not yet described
    Uninitialized,
    /// Registered by the container itself, pipeline prebuilt
    Internal,
    /// Built through the strategy chain from an implementation type
    Type {
        implementation: TypeKey,
        recipe: Arc<Recipe>,
        plan: fn() -> Plan,
        convert: Option<Converter>,
        require_build: bool,
    },
    /// Pre-built value. The registering scope's lifetime manager owns it;
    /// the category only refers to it, so child scopes see the same object.
    Instance(WeakValue),
    /// Produced by a user delegate
    Factory(FactoryFn),
    /// Child-scope copy of a parent registration
    Clone(Weak<RegistrationManager>),
}

impl Category {
    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Category::Uninitialized => "Uninitialized",
            Category::Internal => "Internal",
            Category::Type { .. } => "Type",
            Category::Instance(_) => "Instance",
            Category::Factory(_) => "Factory",
            Category::Clone(_) => "Clone",
        }
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Type {
                implementation,
                require_build,
                ..
            } => f
                .debug_struct("Type")
                .field("implementation", &implementation.name())
                .field("require_build", require_build)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// One registration: contract, category, lifetime manager and the
/// memoized pipeline.
///
/// The pipeline is built at most once per strategy-chain version under a
/// per-registration lock and read without locking afterwards.
pub struct RegistrationManager {
    contract: Contract,
    category: Category,
    lifetime: Box<dyn LifetimeManager>,
    policy: CreationPolicy,
    disposer: Option<Disposer>,
    order: u64,
    source: Option<Weak<RegistrationManager>>,
    pipeline: ArcSwapOption<Pipeline>,
    build_lock: Mutex<()>,
}

impl RegistrationManager {
    pub(crate) fn new(
        contract: Contract,
        category: Category,
        lifetime: Box<dyn LifetimeManager>,
        policy: CreationPolicy,
        disposer: Option<Disposer>,
        order: u64,
    ) -> Self {
        Self {
            contract,
            category,
            lifetime,
            policy,
            disposer,
            order,
            source: None,
            pipeline: ArcSwapOption::empty(),
            build_lock: Mutex::new(()),
        }
    }

    /// Registration with a pinned pipeline that is never rebuilt
    pub(crate) fn internal(
        contract: Contract,
        lifetime: Box<dyn LifetimeManager>,
        pipeline: Pipeline,
    ) -> Self {
        let manager = Self::new(
            contract,
            Category::Internal,
            lifetime,
            CreationPolicy::NonShared,
            None,
            0,
        );
        manager.pipeline.store(Some(Arc::new(pipeline)));
        manager
    }

    /// Copy of `parent` for a child scope, with a fresh lifetime manager
    pub(crate) fn clone_for_scope(parent: &Arc<RegistrationManager>) -> Self {
        Self::new(
            parent.contract.clone(),
            Category::Clone(Arc::downgrade(parent)),
            parent.lifetime.clone_manager(),
            parent.policy,
            parent.disposer,
            parent.order,
        )
    }

    /// Closed registration for `contract` made from an open generic one
    pub(crate) fn close_generic(open: &Arc<RegistrationManager>, contract: &Contract) -> Self {
        let category = match &open.category {
            Category::Factory(factory) => Category::Factory(Arc::clone(factory)),
            _ => Category::Uninitialized,
        };
        let mut closed = Self::new(
            contract.clone(),
            category,
            open.lifetime.clone_manager(),
            open.policy,
            open.disposer,
            open.order,
        );
        closed.source = Some(Arc::downgrade(open));
        closed
    }

    /// Whether this registration was derived from another one rather than
    /// registered directly (scope copies and closed generics)
    pub(crate) fn is_derived(&self) -> bool {
        self.source.is_some() || matches!(self.category, Category::Clone(_))
    }

    /// Whether this registration was derived from `source` itself, not from
    /// a registration `source` has since replaced
    pub(crate) fn is_derived_from(&self, source: &Arc<RegistrationManager>) -> bool {
        let parent = match (&self.category, &self.source) {
            (Category::Clone(parent), _) => parent,
            (_, Some(parent)) => parent,
            _ => return false,
        };
        std::ptr::eq(parent.as_ptr(), Arc::as_ptr(source))
    }

    #[inline]
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    #[inline]
    pub fn category(&self) -> &Category {
        &self.category
    }

    #[inline]
    pub fn lifetime(&self) -> &dyn LifetimeManager {
        self.lifetime.as_ref()
    }

    #[inline]
    pub fn policy(&self) -> CreationPolicy {
        self.policy
    }

    #[inline]
    pub fn disposer(&self) -> Option<Disposer> {
        self.disposer
    }

    /// Registration sequence number
    #[inline]
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Registration whose category describes this one, following clones
    pub fn origin(self: &Arc<Self>) -> Option<Arc<Self>> {
        match &self.category {
            Category::Clone(parent) => parent.upgrade()?.origin(),
            _ => Some(Arc::clone(self)),
        }
    }

    /// Memoized pipeline if it is still current
    pub(crate) fn cached_pipeline(&self, version: u64) -> Option<Arc<Pipeline>> {
        self.pipeline
            .load_full()
            .filter(|pipeline| pipeline.is_current(version))
    }

    /// Memoized pipeline, building it with `build` on a miss.
    ///
    /// Concurrent callers for the same registration build at most once.
    pub(crate) fn pipeline_or_build(
        &self,
        version: u64,
        build: impl FnOnce() -> Arc<Pipeline>,
    ) -> Arc<Pipeline> {
        if let Some(pipeline) = self.cached_pipeline(version) {
            return pipeline;
        }

        let _guard = self.build_lock.lock();
        if let Some(pipeline) = self.cached_pipeline(version) {
            return pipeline;
        }

        let pipeline = build();

        #[cfg(feature = "logging")]
        trace!(
            target: "ioc_pipeline",
            contract = %self.contract,
            pipeline = pipeline.label(),
            version,
            "Pipeline built"
        );

        self.pipeline.store(Some(Arc::clone(&pipeline)));
        pipeline
    }

    pub(crate) fn dispose(&self) {
        self.lifetime.dispose();
    }
}

impl fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("contract", &self.contract)
            .field("category", &self.category)
            .field("lifetime", &self.lifetime.name())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Snapshot of one registration for diagnostics
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    pub contract: Contract,
    pub category: &'static str,
    pub lifetime: &'static str,
    /// Whether the lifetime manager currently holds a value
    pub cached: bool,
}

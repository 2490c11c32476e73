//! Per-resolution state threaded through pipelines and strategies

use crate::inject::Building;
use crate::registration::RegistrationManager;
use crate::scope::Scope;
use crate::{Container, Contract, DiError, Plan, Recipe, Resolvable, Result, Value};
use ahash::AHashMap;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// State shared by every context of one top-level resolve call.
///
/// Holds values cached by per-resolve lifetimes; dropped when the
/// top-level call returns.
#[derive(Default)]
pub struct Operation {
    per_resolve: RefCell<AHashMap<u64, Value>>,
}

impl Operation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: u64) -> Option<Value> {
        self.per_resolve.borrow().get(&id).cloned()
    }

    pub(crate) fn set(&self, id: u64, value: Value) {
        self.per_resolve.borrow_mut().insert(id, value);
    }
}

/// One resolution in flight.
///
/// Nested dependency resolutions get a child context linked to this one,
/// which is how cycles are detected and depth is counted. Pipelines report
/// failure by setting the fault with [`ResolutionContext::fail`]; the
/// engine stops at the next check and the error surfaces to the caller.
pub struct ResolutionContext<'a> {
    contract: Contract,
    container: &'a Container,
    operation: &'a Operation,
    parent: Option<&'a ResolutionContext<'a>>,
    depth: usize,
    plan: fn() -> Plan,
    registration: Option<Arc<RegistrationManager>>,
    recipe: Option<Arc<Recipe>>,
    existing: Option<Building>,
    target: Option<Value>,
    error: Option<DiError>,
}

impl<'a> ResolutionContext<'a> {
    pub(crate) fn root(
        container: &'a Container,
        operation: &'a Operation,
        contract: Contract,
        plan: fn() -> Plan,
    ) -> Self {
        Self {
            contract,
            container,
            operation,
            parent: None,
            depth: 0,
            plan,
            registration: None,
            recipe: None,
            existing: None,
            target: None,
            error: None,
        }
    }

    /// Contract being resolved
    #[inline]
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Container the resolve was issued against
    #[inline]
    pub fn container(&self) -> &'a Container {
        self.container
    }

    #[inline]
    pub(crate) fn scope(&self) -> &'a Scope {
        self.container.scope()
    }

    #[inline]
    pub(crate) fn operation(&self) -> &'a Operation {
        self.operation
    }

    /// Resolution that asked for this one
    #[inline]
    pub fn parent(&self) -> Option<&ResolutionContext<'a>> {
        self.parent
    }

    /// Nesting level, `0` for the top-level call
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Unregistered-resolution plan of the requested type
    #[inline]
    pub fn plan(&self) -> Plan {
        (self.plan)()
    }

    /// Registration being resolved, if any
    #[inline]
    pub fn registration(&self) -> Option<&Arc<RegistrationManager>> {
        self.registration.as_ref()
    }

    pub(crate) fn set_registration(&mut self, registration: Arc<RegistrationManager>) {
        self.registration = Some(registration);
    }

    /// Recipe driving the build strategies
    #[inline]
    pub fn recipe(&self) -> Option<&Arc<Recipe>> {
        self.recipe.as_ref()
    }

    pub(crate) fn set_recipe(&mut self, recipe: Arc<Recipe>) {
        self.recipe = Some(recipe);
    }

    /// Whether an object is under construction
    #[inline]
    pub fn has_existing(&self) -> bool {
        self.existing.is_some()
    }

    /// Take the object under construction
    pub fn take_existing(&mut self) -> Option<Building> {
        self.existing.take()
    }

    /// Put the object under construction back
    pub fn set_existing(&mut self, obj: Building) {
        self.existing = Some(obj);
    }

    /// Result slot
    #[inline]
    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    /// Fill the result slot
    pub fn set_target(&mut self, value: Value) {
        self.target = Some(value);
    }

    pub(crate) fn take_target(&mut self) -> Option<Value> {
        self.target.take()
    }

    /// Record a fault; the first one wins
    pub fn fail(&mut self, error: DiError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Whether the resolution has faulted
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.error.is_some()
    }

    /// Recorded fault
    #[inline]
    pub fn error(&self) -> Option<&DiError> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<DiError> {
        self.error.take()
    }

    /// Whether an enclosing resolution is already building this contract
    pub(crate) fn is_cycle(&self) -> bool {
        let mut current = self.parent;
        while let Some(ctx) = current {
            if ctx.contract == self.contract {
                return true;
            }
            current = ctx.parent;
        }
        false
    }

    /// Resolve a dependency as a child of this resolution
    pub fn resolve<T: ?Sized + Resolvable>(&mut self) -> Result<Arc<T>> {
        self.resolve_contract(Contract::of::<T>(), T::plan)?
            .downcast::<T>()
            .ok_or_else(DiError::type_mismatch::<T>)
    }

    /// Resolve a named dependency as a child of this resolution
    pub fn resolve_named<T: ?Sized + Resolvable>(&mut self, name: &str) -> Result<Arc<T>> {
        self.resolve_contract(Contract::named::<T>(name), T::plan)?
            .downcast::<T>()
            .ok_or_else(DiError::type_mismatch::<T>)
    }

    /// Resolve an arbitrary contract as a child of this resolution.
    ///
    /// Errors are returned as raised; only the top-level call wraps them.
    pub fn resolve_contract(&mut self, contract: Contract, plan: fn() -> Plan) -> Result<Value> {
        let container = self.container;
        let operation = self.operation;
        let depth = self.depth + 1;

        let mut child = ResolutionContext {
            contract,
            container,
            operation,
            parent: Some(&*self),
            depth,
            plan,
            registration: None,
            recipe: None,
            existing: None,
            target: None,
            error: None,
        };

        let value = container.scope().engine().resolve(&mut child);
        match child.take_error() {
            Some(error) => Err(error),
            None => value.ok_or_else(|| DiError::not_found(child.contract())),
        }
    }
}

impl fmt::Debug for ResolutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("contract", &self.contract)
            .field("depth", &self.depth)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

//! Built-in generic patterns
//!
//! These types resolve without registration for any resolvable `T`:
//!
//! - [`Lazy<T>`] resolves `T` on first access and keeps the result
//! - [`Func<T>`] resolves `T` again on every call
//! - [`Enumerable<T>`] resolves every registration of `T`, including the
//!   default one, falling back to resolving `T` itself when nothing is
//!   registered
//! - `Vec<Arc<T>>` resolves named registrations of `T` only
//!
//! Each closed type gets its own pipeline, built on first use and cached
//! like any other unregistered type.

use crate::pipeline::Pipeline;
use crate::{
    Contract, Definition, DiError, Plan, ResolutionContext, Resolvable, Result, TypeKey, Value,
    WeakContainer,
};
use once_cell::sync::OnceCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Builds the pipeline for one closed generic type.
pub trait PatternFactory: Send + Sync {
    /// Definition this factory closes
    fn definition(&self) -> Definition;

    /// Pipeline for the closed type
    fn pipeline(&self, version: u64) -> Pipeline;
}

struct Pattern<P: ?Sized> {
    definition: Definition,
    build: fn(&mut ResolutionContext<'_>) -> Result<Value>,
    _marker: PhantomData<fn() -> Box<P>>,
}

impl<P: ?Sized> Pattern<P> {
    fn new(definition: Definition, build: fn(&mut ResolutionContext<'_>) -> Result<Value>) -> Self {
        Self {
            definition,
            build,
            _marker: PhantomData,
        }
    }
}

impl<P: ?Sized + 'static> PatternFactory for Pattern<P> {
    fn definition(&self) -> Definition {
        self.definition
    }

    fn pipeline(&self, version: u64) -> Pipeline {
        let build = self.build;
        Pipeline::new(self.definition.name(), version, move |ctx| match build(ctx) {
            Ok(value) => Some(value),
            Err(e) => {
                ctx.fail(e);
                None
            }
        })
    }
}

// =============================================================================
// Lazy
// =============================================================================

/// Deferred resolution of `T`, performed at most once.
///
/// Holds only a weak handle to the container; accessing the value after
/// the container is gone fails with [`DiError::ContainerDisposed`].
pub struct Lazy<T: ?Sized> {
    container: WeakContainer,
    name: Option<Arc<str>>,
    cell: OnceCell<Arc<T>>,
}

impl<T: ?Sized + Resolvable> Lazy<T> {
    fn new(container: WeakContainer, name: Option<&str>) -> Self {
        Self {
            container,
            name: name.map(Arc::from),
            cell: OnceCell::new(),
        }
    }

    /// Resolve on first call, then return the same instance
    pub fn value(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                let container = self.container.upgrade().ok_or(DiError::ContainerDisposed)?;
                match &self.name {
                    Some(name) => container.resolve_named::<T>(name),
                    None => container.resolve::<T>(),
                }
            })
            .cloned()
    }

    /// Whether the value has been resolved
    #[inline]
    pub fn is_created(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("type", &std::any::type_name::<T>())
            .field("created", &self.cell.get().is_some())
            .finish()
    }
}

fn build_lazy<T: ?Sized + Resolvable>(ctx: &mut ResolutionContext<'_>) -> Result<Value> {
    let lazy = Lazy::<T>::new(ctx.container().downgrade(), ctx.contract().name());
    Ok(Value::from_owned(lazy))
}

impl<T: ?Sized + Resolvable> Resolvable for Lazy<T> {
    fn definition() -> Option<Definition> {
        Some(Definition::LAZY)
    }

    fn plan() -> Plan {
        Plan::Pattern(Arc::new(Pattern::<Lazy<T>>::new(Definition::LAZY, build_lazy::<T>)))
    }
}

// =============================================================================
// Func
// =============================================================================

/// Factory handle that resolves `T` anew on every call.
pub struct Func<T: ?Sized> {
    container: WeakContainer,
    name: Option<Arc<str>>,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Resolvable> Func<T> {
    /// Resolve `T` from the container
    pub fn call(&self) -> Result<Arc<T>> {
        let container = self.container.upgrade().ok_or(DiError::ContainerDisposed)?;
        match &self.name {
            Some(name) => container.resolve_named::<T>(name),
            None => container.resolve::<T>(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Func<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("type", &std::any::type_name::<T>())
            .field("name", &self.name)
            .finish()
    }
}

fn build_func<T: ?Sized + Resolvable>(ctx: &mut ResolutionContext<'_>) -> Result<Value> {
    let func = Func::<T> {
        container: ctx.container().downgrade(),
        name: ctx.contract().name().map(Arc::from),
        _marker: PhantomData,
    };
    Ok(Value::from_owned(func))
}

impl<T: ?Sized + Resolvable> Resolvable for Func<T> {
    fn definition() -> Option<Definition> {
        Some(Definition::FUNC)
    }

    fn plan() -> Plan {
        Plan::Pattern(Arc::new(Pattern::<Func<T>>::new(Definition::FUNC, build_func::<T>)))
    }
}

// =============================================================================
// Enumerable and arrays
// =============================================================================

/// Every registered `T` visible from the resolving container.
///
/// Order follows registration order, nearest scope first. A name
/// registered in several scopes contributes only the nearest one.
pub struct Enumerable<T: ?Sized> {
    items: Vec<Arc<T>>,
}

impl<T: ?Sized> Enumerable<T> {
    /// Take the resolved items
    pub fn into_vec(self) -> Vec<Arc<T>> {
        self.items
    }
}

impl<T: ?Sized> Deref for Enumerable<T> {
    type Target = [Arc<T>];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<'a, T: ?Sized> IntoIterator for &'a Enumerable<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: ?Sized> fmt::Debug for Enumerable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enumerable")
            .field("type", &std::any::type_name::<T>())
            .field("len", &self.items.len())
            .finish()
    }
}

/// Resolve each registration of `T` as a child of `ctx`.
///
/// Registrations that cannot be closed over `T` are skipped; any other
/// failure aborts the whole collection.
fn collect<T: ?Sized + Resolvable>(
    ctx: &mut ResolutionContext<'_>,
    include_default: bool,
) -> Result<Vec<Arc<T>>> {
    let element = TypeKey::of::<T>();
    let snapshot = ctx.scope().snapshot(element, include_default);

    let mut items = Vec::with_capacity(snapshot.names().len());
    for name in snapshot.names() {
        let contract = Contract::new(element, name.as_deref());
        match ctx.resolve_contract(contract, T::plan) {
            Ok(value) => items.push(value.downcast::<T>().ok_or_else(DiError::type_mismatch::<T>)?),
            Err(e) if e.is_generic_argument() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}

fn build_enumerable<T: ?Sized + Resolvable>(ctx: &mut ResolutionContext<'_>) -> Result<Value> {
    let mut items = collect::<T>(ctx, true)?;

    if items.is_empty() && ctx.scope().snapshot(TypeKey::of::<T>(), true).names().is_empty() {
        let element = Contract::of::<T>();
        match ctx.resolve_contract(element.clone(), T::plan) {
            Ok(value) => items.push(value.downcast::<T>().ok_or_else(DiError::type_mismatch::<T>)?),
            Err(e) if e.is_generic_argument() => {}
            Err(DiError::NotFound { contract }) if contract == element.to_string() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(Value::from_owned(Enumerable { items }))
}

impl<T: ?Sized + Resolvable> Resolvable for Enumerable<T> {
    fn definition() -> Option<Definition> {
        Some(Definition::ENUMERABLE)
    }

    fn plan() -> Plan {
        Plan::Pattern(Arc::new(Pattern::<Enumerable<T>>::new(
            Definition::ENUMERABLE,
            build_enumerable::<T>,
        )))
    }
}

fn build_array<T: ?Sized + Resolvable>(ctx: &mut ResolutionContext<'_>) -> Result<Value> {
    let items = collect::<T>(ctx, false)?;
    Ok(Value::from_owned(items))
}

impl<T: ?Sized + Resolvable> Resolvable for Vec<Arc<T>> {
    fn definition() -> Option<Definition> {
        Some(Definition::ARRAY)
    }

    fn plan() -> Plan {
        Plan::Pattern(Arc::new(Pattern::<Vec<Arc<T>>>::new(
            Definition::ARRAY,
            build_array::<T>,
        )))
    }
}

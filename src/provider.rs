//! Provider traits for resolution
//!
//! These traits define what types can be resolved and how the container
//! may produce them when no registration exists.

use crate::generic::PatternFactory;
use crate::inject::{Construct, Recipe};
use crate::Definition;
use std::sync::Arc;

/// Marker trait for anything the container can hold.
///
/// Automatically implemented for every `Send + Sync + 'static` type,
/// including trait objects.
pub trait Injectable: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// A type that can be requested from the container.
///
/// The default implementation only resolves through registrations. Types
/// that should also resolve without a registration return a
/// [`Plan::Construct`] from [`Resolvable::plan`]; the [`resolvable!`]
/// macro writes both forms.
///
/// # Examples
///
/// ```rust
/// use ioc_pipeline::{resolvable, Construct, Container};
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// #[derive(Default)]
/// struct Widget;
///
/// impl Construct for Widget {
///     type Dependencies = ();
///     fn create(_: ()) -> Self {
///         Widget
///     }
/// }
///
/// resolvable!(dyn Clock);
/// resolvable!(construct Widget);
///
/// let container = Container::new();
/// assert!(container.resolve::<Widget>().is_ok());
/// assert!(container.resolve::<dyn Clock>().is_err());
/// ```
///
/// [`resolvable!`]: crate::resolvable
pub trait Resolvable: Injectable {
    /// Open generic definition this type was closed from, if any
    #[inline]
    fn definition() -> Option<Definition> {
        None
    }

    /// How to produce the type when it has no registration
    #[inline]
    fn plan() -> Plan {
        Plan::Unresolvable
    }
}

/// Unregistered-resolution plan for a type.
#[derive(Clone)]
pub enum Plan {
    /// Only registrations can produce the type
    Unresolvable,
    /// Build through the strategy chain using this recipe
    Construct(Arc<Recipe>),
    /// Closed generic pattern such as `Lazy<T>` or `Enumerable<T>`
    Pattern(Arc<dyn PatternFactory>),
}

impl Plan {
    /// Plan that builds `T` from its [`Construct`] implementation
    #[inline]
    pub fn construct<T: Construct>() -> Plan {
        Plan::Construct(Arc::new(Recipe::of::<T>()))
    }

    /// Whether the plan can produce anything
    #[inline]
    pub fn is_resolvable(&self) -> bool {
        !matches!(self, Plan::Unresolvable)
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plan::Unresolvable => f.write_str("Unresolvable"),
            Plan::Construct(recipe) => f.debug_tuple("Construct").field(&recipe.key().name()).finish(),
            Plan::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.definition()).finish(),
        }
    }
}

/// Helper macro to implement [`Resolvable`]
///
/// ```rust,ignore
/// resolvable!(dyn Logger, Config);     // registrations only
/// resolvable!(construct Widget, Gauge); // may also be built unregistered
/// ```
#[macro_export]
macro_rules! resolvable {
    (construct $($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Resolvable for $ty {
                fn plan() -> $crate::Plan {
                    $crate::Plan::construct::<$ty>()
                }
            }
        )+
    };
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Resolvable for $ty {}
        )+
    };
}

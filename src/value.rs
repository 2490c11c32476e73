//! Type-erased instances flowing through pipelines and lifetime managers

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Synchronous teardown hook for registrations marked `.disposable()`.
///
/// Disposal runs when the owning scope (or the lifetime manager holding the
/// value) is disposed. Dropping the last `Arc` still frees the memory as usual.
pub trait Dispose: Send + Sync + 'static {
    /// Release resources held by the value
    fn dispose(&self);
}

/// Erased disposal entry point attached to a [`Value`]
pub type Disposer = fn(&Value);

trait Slot: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn downgrade(&self) -> Box<dyn WeakSlot>;
    fn type_name(&self) -> &'static str;
}

trait WeakSlot: Send + Sync {
    fn upgrade(&self) -> Option<Arc<dyn Slot>>;
}

struct Typed<T: ?Sized>(Arc<T>);

impl<T: ?Sized + Send + Sync + 'static> Slot for Typed<T> {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn downgrade(&self) -> Box<dyn WeakSlot> {
        Box::new(TypedWeak(Arc::downgrade(&self.0)))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

struct TypedWeak<T: ?Sized>(Weak<T>);

impl<T: ?Sized + Send + Sync + 'static> WeakSlot for TypedWeak<T> {
    fn upgrade(&self) -> Option<Arc<dyn Slot>> {
        self.0
            .upgrade()
            .map(|strong| Arc::new(Typed(strong)) as Arc<dyn Slot>)
    }
}

/// A resolved instance with its concrete type erased.
///
/// Wraps an `Arc<T>` for any `T: ?Sized`, so trait objects travel through
/// the engine the same way concrete types do. Cloning is an `Arc` clone.
#[derive(Clone)]
pub struct Value {
    slot: Arc<dyn Slot>,
    disposer: Option<Disposer>,
}

impl Value {
    /// Erase an `Arc<T>`
    #[inline]
    pub fn new<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            slot: Arc::new(Typed(instance)),
            disposer: None,
        }
    }

    /// Erase an owned value
    #[inline]
    pub fn from_owned<T: Send + Sync + 'static>(instance: T) -> Self {
        Self::new(Arc::new(instance))
    }

    /// Recover the typed `Arc<T>`
    #[inline]
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.slot.as_any().downcast_ref::<Arc<T>>().cloned()
    }

    /// Attach a disposal hook
    #[inline]
    pub fn with_disposer(mut self, disposer: Option<Disposer>) -> Self {
        if disposer.is_some() {
            self.disposer = disposer;
        }
        self
    }

    /// Whether disposing this value does anything
    #[inline]
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// Run the disposal hook, if any
    pub fn dispose(&self) {
        if let Some(disposer) = self.disposer {
            disposer(self);
        }
    }

    /// Weak handle that does not keep the instance alive
    pub fn downgrade(&self) -> WeakValue {
        WeakValue {
            slot: self.slot.downgrade(),
            disposer: self.disposer,
        }
    }

    /// Concrete type name
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.slot.type_name()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name())
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// Weak counterpart of [`Value`]
pub struct WeakValue {
    slot: Box<dyn WeakSlot>,
    disposer: Option<Disposer>,
}

impl WeakValue {
    /// Upgrade if the instance is still alive
    pub fn upgrade(&self) -> Option<Value> {
        self.slot.upgrade().map(|slot| Value {
            slot,
            disposer: self.disposer,
        })
    }
}

impl fmt::Debug for WeakValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakValue")
            .field("alive", &self.slot.upgrade().is_some())
            .finish()
    }
}

fn dispose_erased<T: ?Sized + Dispose>(value: &Value) {
    if let Some(instance) = value.downcast::<T>() {
        instance.dispose();
    }
}

/// Disposal hook for values of type `T`
#[inline]
pub fn disposer_for<T: ?Sized + Dispose>() -> Disposer {
    dispose_erased::<T>
}

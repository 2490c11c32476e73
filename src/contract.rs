//! Contracts: the `(type, name)` identity of what is being resolved

use crate::Resolvable;
use std::any::TypeId;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

/// Fixed seeds so every contract for the same `(type, name)` hashes identically.
const CONTRACT_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Name of an open generic definition such as `Lazy` or `Enumerable`.
///
/// Closed generic types report their definition through
/// [`Resolvable::definition`]; registrations made against a definition
/// apply to every closed type that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Definition(&'static str);

impl Definition {
    /// `Lazy<T>`
    pub const LAZY: Definition = Definition("Lazy");
    /// `Func<T>`
    pub const FUNC: Definition = Definition("Func");
    /// `Enumerable<T>`
    pub const ENUMERABLE: Definition = Definition("Enumerable");
    /// `Vec<Arc<T>>`
    pub const ARRAY: Definition = Definition("Array");

    /// Declare a user generic definition
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Definition name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<>", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Ident {
    Closed(TypeId),
    Open(Definition),
}

/// Identity of a type as seen by the container.
///
/// Equality and hashing only consider the underlying [`TypeId`] (or the
/// open definition); the name is kept for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    ident: Ident,
    name: &'static str,
    definition: Option<Definition>,
}

impl TypeKey {
    /// Key of a resolvable type, including its generic definition
    #[inline]
    pub fn of<T: ?Sized + Resolvable>() -> Self {
        Self {
            ident: Ident::Closed(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
            definition: T::definition(),
        }
    }

    /// Key of any `'static` type, without generic information
    #[inline]
    pub fn of_type<T: ?Sized + 'static>() -> Self {
        Self {
            ident: Ident::Closed(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
            definition: None,
        }
    }

    /// Key standing for an open generic definition
    #[inline]
    pub fn open(definition: Definition) -> Self {
        Self {
            ident: Ident::Open(definition),
            name: definition.name(),
            definition: None,
        }
    }

    /// The `TypeId` of a closed type
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        match self.ident {
            Ident::Closed(id) => Some(id),
            Ident::Open(_) => None,
        }
    }

    /// Whether this key is exactly `T`
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.ident == Ident::Closed(TypeId::of::<T>())
    }

    /// Whether this key stands for an open definition
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self.ident, Ident::Open(_))
    }

    /// Type name for diagnostics
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Generic definition the closed type was built from
    #[inline]
    pub fn definition(&self) -> Option<Definition> {
        self.definition
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Immutable `(type, name)` key with a precomputed hash.
///
/// `hash = hash(type) ^ hash(name)`, where an absent name contributes `0`.
#[derive(Clone)]
pub struct Contract {
    key: TypeKey,
    name: Option<Arc<str>>,
    hash: u64,
}

impl Contract {
    /// Create a contract
    pub fn new(key: TypeKey, name: Option<&str>) -> Self {
        let name: Option<Arc<str>> = name.map(Arc::from);
        let hash = Self::compute_hash(&key, name.as_deref());
        Self { key, name, hash }
    }

    /// Default (unnamed) contract for `T`
    #[inline]
    pub fn of<T: ?Sized + Resolvable>() -> Self {
        Self::new(TypeKey::of::<T>(), None)
    }

    /// Named contract for `T`
    #[inline]
    pub fn named<T: ?Sized + Resolvable>(name: &str) -> Self {
        Self::new(TypeKey::of::<T>(), Some(name))
    }

    /// Redirect to another type while keeping the name
    pub fn map(&self, key: TypeKey) -> Self {
        let hash = Self::compute_hash(&key, self.name.as_deref());
        Self {
            key,
            name: self.name.clone(),
            hash,
        }
    }

    fn compute_hash(key: &TypeKey, name: Option<&str>) -> u64 {
        let state = ahash::RandomState::with_seeds(
            CONTRACT_SEEDS[0],
            CONTRACT_SEEDS[1],
            CONTRACT_SEEDS[2],
            CONTRACT_SEEDS[3],
        );
        let type_hash = state.hash_one(key);
        let name_hash = name.map(|n| state.hash_one(n)).unwrap_or(0);
        type_hash ^ name_hash
    }

    /// Requested type
    #[inline]
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Registration name, if any
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Precomputed hash
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for Contract {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.key == other.key && self.name == other.name
    }
}

impl Eq for Contract {}

impl Hash for Contract {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}(\"{}\")", self.key, name),
            None => write!(f, "{}", self.key),
        }
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("type", &self.key.name())
            .field("name", &self.name)
            .finish()
    }
}

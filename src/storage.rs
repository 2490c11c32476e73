//! Registration storage for one scope
//!
//! Uses DashMap for lock-free concurrent access. Parent lookups are done
//! by the scope, which walks its ancestors' registries in order.

use crate::registration::RegistrationManager;
use crate::{Contract, TypeKey};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe map from contract to registration
pub(crate) struct Registry {
    entries: DashMap<Contract, Arc<RegistrationManager>, RandomState>,
}

impl Registry {
    /// Create with pre-allocated capacity.
    ///
    /// Shard count scales with the expected number of registrations;
    /// DashMap's default of `num_cpus * 4` is far more than a typical
    /// scope needs.
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
        }
    }

    /// Insert or replace, returning the replaced registration
    #[inline]
    pub fn insert(&self, manager: Arc<RegistrationManager>) -> Option<Arc<RegistrationManager>> {
        self.entries.insert(manager.contract().clone(), manager)
    }

    /// Keep the stored registration while `current` accepts it, otherwise
    /// store a new one from `create`.
    ///
    /// Returns the registration that ends up stored and the one it replaced.
    pub fn get_or_replace_with(
        &self,
        contract: &Contract,
        current: impl FnOnce(&RegistrationManager) -> bool,
        create: impl FnOnce() -> RegistrationManager,
    ) -> (Arc<RegistrationManager>, Option<Arc<RegistrationManager>>) {
        match self.entries.entry(contract.clone()) {
            Entry::Occupied(mut entry) => {
                if current(entry.get()) {
                    return (Arc::clone(entry.get()), None);
                }
                let manager = Arc::new(create());
                let replaced = entry.insert(Arc::clone(&manager));
                (manager, Some(replaced))
            }
            Entry::Vacant(entry) => (Arc::clone(entry.insert(Arc::new(create())).value()), None),
        }
    }

    #[inline]
    pub fn get(&self, contract: &Contract) -> Option<Arc<RegistrationManager>> {
        self.entries.get(contract).map(|entry| Arc::clone(entry.value()))
    }

    #[inline]
    pub fn contains(&self, contract: &Contract) -> bool {
        self.entries.contains_key(contract)
    }

    /// Registrations of `key` under any name, in registration order
    pub fn for_type(&self, key: &TypeKey) -> Vec<Arc<RegistrationManager>> {
        let mut found: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.key().key() == key)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by_key(|manager| manager.order());
        found
    }

    /// All registrations, in registration order
    pub fn all(&self) -> Vec<Arc<RegistrationManager>> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by_key(|manager| manager.order());
        all
    }

    /// Remove everything, returning what was stored
    pub fn drain(&self) -> Vec<Arc<RegistrationManager>> {
        let all = self.all();
        self.entries.clear();
        all
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetime::Lifetime;
    use crate::registration::{Category, CreationPolicy};
    use crate::resolvable;

    struct Probe;
    struct Other;
    resolvable!(Probe, Other);

    fn manager(contract: Contract, order: u64) -> RegistrationManager {
        RegistrationManager::new(
            contract,
            Category::Uninitialized,
            Lifetime::Singleton.manager(),
            CreationPolicy::Any,
            None,
            order,
        )
    }

    #[test]
    fn test_insert_replaces() {
        let registry = Registry::with_capacity(4);
        assert!(registry.insert(Arc::new(manager(Contract::of::<Probe>(), 1))).is_none());
        let replaced = registry.insert(Arc::new(manager(Contract::of::<Probe>(), 2)));
        assert_eq!(replaced.unwrap().order(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_for_type_in_order() {
        let registry = Registry::with_capacity(4);
        registry.insert(Arc::new(manager(Contract::named::<Probe>("b"), 3)));
        registry.insert(Arc::new(manager(Contract::named::<Probe>("a"), 1)));
        registry.insert(Arc::new(manager(Contract::of::<Other>(), 2)));

        let names: Vec<_> = registry
            .for_type(&TypeKey::of::<Probe>())
            .iter()
            .map(|m| m.contract().name().map(String::from))
            .collect();
        assert_eq!(names, vec![Some("a".to_string()), Some("b".to_string())]);
    }

    #[test]
    fn test_get_or_replace_when_stale() {
        let registry = Registry::with_capacity(4);
        let contract = Contract::of::<Probe>();
        registry.insert(Arc::new(manager(contract.clone(), 1)));

        let (kept, replaced) =
            registry.get_or_replace_with(&contract, |m| m.order() == 1, || manager(contract.clone(), 2));
        assert_eq!(kept.order(), 1);
        assert!(replaced.is_none());

        let (fresh, replaced) =
            registry.get_or_replace_with(&contract, |m| m.order() == 5, || manager(contract.clone(), 3));
        assert_eq!(fresh.order(), 3);
        assert_eq!(replaced.unwrap().order(), 1);
        assert_eq!(registry.get(&contract).unwrap().order(), 3);
    }
}

#![no_main]

//! Fuzz target for child containers and disposal
//!
//! Builds random scope trees, overrides registrations at arbitrary levels
//! and disposes scopes in arbitrary order. Each scope must keep seeing
//! its nearest registration and hierarchical values must stay per scope.

use arbitrary::Arbitrary;
use ioc_pipeline::{Construct, Container, Dispose, Lifetime, resolvable};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

struct Level(u32);

struct PerScope;

impl Construct for PerScope {
    type Dependencies = ();
    fn create(_: ()) -> Self {
        PerScope
    }
}

impl Dispose for PerScope {
    fn dispose(&self) {}
}

resolvable!(Level);
resolvable!(construct PerScope);

#[derive(Debug, Arbitrary)]
enum ScopedOp {
    CreateChild(u8),
    Override(u8, u32),
    ResolveLevel(u8),
    ResolvePerScope(u8),
    ResolveAll(u8),
    Dispose(u8),
}

fuzz_target!(|ops: Vec<ScopedOp>| {
    let root = Container::new();
    let _ = root.singleton(Level(0));
    let _ = root
        .register::<PerScope>()
        .lifetime(Lifetime::Hierarchical)
        .disposable()
        .to_self();

    let mut scopes = vec![root];
    let mut parents: Vec<Option<usize>> = vec![None];
    let mut own: Vec<Option<u32>> = vec![Some(0)];

    // nearest live registration of Level, walking up from `index`
    let expected = |parents: &[Option<usize>],
                    own: &[Option<u32>],
                    scopes: &[Container],
                    index: usize| {
        let mut current = Some(index);
        while let Some(i) = current {
            if !scopes[i].is_disposed() {
                if let Some(value) = own[i] {
                    return Some(value);
                }
            }
            current = parents[i];
        }
        None
    };

    for op in ops.into_iter().take(128) {
        match op {
            ScopedOp::CreateChild(parent) => {
                if scopes.len() >= 32 {
                    continue;
                }
                let index = parent as usize % scopes.len();
                scopes.push(scopes[index].create_child_container());
                parents.push(Some(index));
                own.push(None);
            }
            ScopedOp::Override(at, value) => {
                let index = at as usize % scopes.len();
                if scopes[index].singleton(Level(value)).is_ok() {
                    own[index] = Some(value);
                }
            }
            ScopedOp::ResolveLevel(at) => {
                let index = at as usize % scopes.len();
                let resolved = scopes[index].resolve::<Level>().ok().map(|level| level.0);
                if scopes[index].is_disposed() {
                    assert!(resolved.is_none(), "disposed scope resolved a value");
                } else {
                    assert_eq!(resolved, expected(&parents, &own, &scopes, index));
                }
            }
            ScopedOp::ResolvePerScope(at) => {
                let index = at as usize % scopes.len();
                let scope = &scopes[index];
                // without a live registration PerScope falls back to transient construction
                if !scope.is_registered::<PerScope>() {
                    continue;
                }
                if let (Ok(a), Ok(b)) = (scope.resolve::<PerScope>(), scope.resolve::<PerScope>()) {
                    assert!(Arc::ptr_eq(&a, &b), "hierarchical value changed within a scope");
                }
            }
            ScopedOp::ResolveAll(at) => {
                let index = at as usize % scopes.len();
                let _ = scopes[index].resolve_all::<Level>();
            }
            ScopedOp::Dispose(at) => {
                let index = at as usize % scopes.len();
                scopes[index].dispose();
            }
        }
    }
});

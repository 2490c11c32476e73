#![no_main]

//! Fuzz target for concurrent resolution and registration
//!
//! Threads race registrations against resolves of singleton, transient,
//! per-thread and unregistered contracts. Singletons must stay unique.

use arbitrary::Arbitrary;
use ioc_pipeline::{Construct, Container, Lifetime, resolvable};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::thread;

struct Shared;

impl Construct for Shared {
    type Dependencies = ();
    fn create(_: ()) -> Self {
        Shared
    }
}

struct Node {
    _shared: Arc<Shared>,
}

impl Construct for Node {
    type Dependencies = Arc<Shared>;
    fn create(shared: Arc<Shared>) -> Self {
        Node { _shared: shared }
    }
}

#[allow(dead_code)]
struct Tag(u32);

resolvable!(construct Shared, Node);
resolvable!(Tag);

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    ResolveShared,
    ResolveNode,
    ResolveTag(Option<u8>),
    ResolveAllTags,
    RegisterTag(u8, u32),
    RegisterNode(bool),
    CreateChild,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    thread_count: u8,
    ops: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let container = Container::new();
    let _ = container
        .register::<Shared>()
        .lifetime(Lifetime::Singleton)
        .to_self();

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops;

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let container = container.clone();
            let ops = ops.clone();
            thread::spawn(move || {
                let mut seen: Option<Arc<Shared>> = None;
                for op in ops.into_iter().take(64) {
                    match op {
                        ThreadOp::ResolveShared => {
                            let shared = container.resolve::<Shared>().ok();
                            if let (Some(a), Some(b)) = (&seen, &shared) {
                                assert!(Arc::ptr_eq(a, b), "singleton built twice");
                            }
                            seen = seen.or(shared);
                        }
                        ThreadOp::ResolveNode => {
                            let _ = container.resolve::<Node>();
                        }
                        ThreadOp::ResolveTag(name) => {
                            let _ = match name {
                                Some(n) => container.resolve_named::<Tag>(&n.to_string()),
                                None => container.resolve::<Tag>(),
                            };
                        }
                        ThreadOp::ResolveAllTags => {
                            let _ = container.resolve_all::<Tag>();
                        }
                        ThreadOp::RegisterTag(name, value) => {
                            let _ = container
                                .register::<Tag>()
                                .named(name.to_string())
                                .instance(Arc::new(Tag(value)));
                        }
                        ThreadOp::RegisterNode(per_thread) => {
                            let lifetime = if per_thread {
                                Lifetime::PerThread
                            } else {
                                Lifetime::Transient
                            };
                            let _ = container.register::<Node>().lifetime(lifetime).to_self();
                        }
                        ThreadOp::CreateChild => {
                            let child = container.create_child_container();
                            let _ = child.resolve::<Node>();
                            let _ = child.resolve_all::<Tag>();
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("fuzz thread panicked");
    }
});

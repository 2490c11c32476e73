//! Resolution engine
//!
//! Shared by a root container and all of its child scopes. Holds the
//! strategy chain, the pipelines cached for unregistered types and the
//! two resolution algorithms:
//!
//! - registered: consult the lifetime manager, build or reuse the
//!   registration's pipeline, run it, store the result
//! - unregistered: build or reuse the per-type pipeline from the type's
//!   plan and run it

use crate::config::ContainerOptions;
use crate::factory;
use crate::lifetime::{LifetimeContext, LifetimeManager};
use crate::pipeline::Pipeline;
use crate::registration::RegistrationManager;
use crate::strategy::{BuildStrategy, Stage, StrategyChain};
use crate::{DiError, ResolutionContext, TypeKey, Value};
use ahash::RandomState;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{trace, warn};

thread_local! {
    static OPEN_OPERATIONS: Cell<usize> = const { Cell::new(0) };
}

/// Counts top-level resolves nested on the current thread, e.g. a factory
/// delegate resolving through the container it was called with.
pub(crate) struct OperationGuard(());

impl OperationGuard {
    pub fn enter(limit: usize) -> Option<Self> {
        OPEN_OPERATIONS.with(|open| {
            let current = open.get();
            if current >= limit {
                None
            } else {
                open.set(current + 1);
                Some(OperationGuard(()))
            }
        })
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        OPEN_OPERATIONS.with(|open| open.set(open.get().saturating_sub(1)));
    }
}

/// Releases a synchronized lifetime manager if the build does not finish,
/// including when a constructor panics.
struct Hold<'m> {
    lifetime: &'m dyn LifetimeManager,
    cx: &'m LifetimeContext<'m>,
    armed: bool,
}

impl Hold<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if self.armed && self.lifetime.is_synchronized() {
            #[cfg(feature = "logging")]
            warn!(
                target: "ioc_pipeline",
                contract = %self.cx.contract(),
                lifetime = self.lifetime.name(),
                "Build did not complete, releasing lifetime"
            );
            self.lifetime.recover(self.cx);
        }
    }
}

pub(crate) struct Engine {
    options: ContainerOptions,
    chain: ArcSwap<StrategyChain>,
    sequence: AtomicU64,
    generation: AtomicU64,
    unregistered: DashMap<TypeKey, Arc<ArcSwap<Pipeline>>, RandomState>,
    activate: Arc<Pipeline>,
    instance: Arc<Pipeline>,
    factory: Arc<Pipeline>,
}

impl Engine {
    pub fn new(options: ContainerOptions) -> Self {
        Self {
            options,
            chain: ArcSwap::from_pointee(StrategyChain::standard()),
            sequence: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            unregistered: DashMap::with_hasher(RandomState::new()),
            activate: Arc::new(factory::activate()),
            instance: Arc::new(factory::instance()),
            factory: Arc::new(factory::factory()),
        }
    }

    #[inline]
    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    #[inline]
    pub fn chain(&self) -> Arc<StrategyChain> {
        self.chain.load_full()
    }

    #[inline]
    pub fn chain_version(&self) -> u64 {
        self.chain.load().version()
    }

    /// Append a strategy; every cached pipeline becomes stale
    pub fn add_strategy(&self, stage: Stage, strategy: Arc<dyn BuildStrategy>) {
        self.chain
            .rcu(|chain| chain.with(stage, Arc::clone(&strategy)));
    }

    /// Sequence number for a new registration
    #[inline]
    pub fn next_order(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registration-set version used to invalidate enumeration snapshots
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn activate(&self) -> Arc<Pipeline> {
        Arc::clone(&self.activate)
    }

    #[inline]
    pub fn instance(&self) -> Arc<Pipeline> {
        Arc::clone(&self.instance)
    }

    #[inline]
    pub fn factory(&self) -> Arc<Pipeline> {
        Arc::clone(&self.factory)
    }

    /// Resolve the context's contract.
    ///
    /// Returns `None` exactly when the context is faulted.
    pub fn resolve(&self, ctx: &mut ResolutionContext<'_>) -> Option<Value> {
        if ctx.depth() > self.options.max_depth {
            let err = DiError::DepthExceeded {
                contract: ctx.contract().to_string(),
                depth: ctx.depth(),
            };
            ctx.fail(err);
            return None;
        }
        if ctx.is_cycle() {
            let err = DiError::circular(ctx.contract());
            ctx.fail(err);
            return None;
        }
        if ctx.scope().is_disposed() {
            ctx.fail(DiError::ContainerDisposed);
            return None;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "ioc_pipeline",
            contract = %ctx.contract(),
            depth = ctx.depth(),
            "Resolving"
        );

        let value = match ctx.scope().find(ctx.contract()) {
            Some(manager) => self.resolve_registered(ctx, manager),
            None => self.resolve_unregistered(ctx),
        };

        if value.is_none() && !ctx.is_faulted() {
            let err = DiError::not_found(ctx.contract());
            ctx.fail(err);
        }
        value
    }

    fn resolve_registered(
        &self,
        ctx: &mut ResolutionContext<'_>,
        manager: Arc<RegistrationManager>,
    ) -> Option<Value> {
        let contract = ctx.contract().clone();
        let cx = LifetimeContext::new(ctx.scope(), ctx.operation(), &contract);
        let lifetime = manager.lifetime();

        match lifetime.get_value(&cx) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => {
                ctx.fail(e);
                return None;
            }
        }

        let hold = Hold {
            lifetime,
            cx: &cx,
            armed: true,
        };

        ctx.set_registration(Arc::clone(&manager));
        let version = self.chain_version();
        let pipeline = {
            let ctx = &*ctx;
            manager.pipeline_or_build(version, || factory::dispatch(self, ctx, &manager))
        };

        let value = pipeline.run(ctx)?;
        if ctx.is_faulted() {
            return None;
        }

        let value = value.with_disposer(manager.disposer());
        if let Err(e) = lifetime.set_value(value.clone(), &cx) {
            ctx.fail(e);
            return None;
        }
        hold.disarm();
        Some(value)
    }

    fn resolve_unregistered(&self, ctx: &mut ResolutionContext<'_>) -> Option<Value> {
        let key = *ctx.contract().key();
        let version = self.chain_version();

        let slot = match self.unregistered.get(&key) {
            Some(slot) => Arc::clone(slot.value()),
            None => Arc::clone(
                self.unregistered
                    .entry(key)
                    .or_insert_with(|| Arc::new(ArcSwap::new(Arc::clone(&self.activate))))
                    .value(),
            ),
        };

        let current = slot.load_full();
        let pipeline = if Arc::ptr_eq(&current, &self.activate) || !current.is_current(version) {
            let built = factory::from_plan(self, ctx.plan());
            let previous = slot.compare_and_swap(&current, Arc::clone(&built));
            if Arc::ptr_eq(&previous, &current) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "ioc_pipeline",
                    type_name = key.name(),
                    pipeline = built.label(),
                    "Cached pipeline for unregistered type"
                );
                built
            } else {
                // lost the race; reuse the winner
                arc_swap::Guard::into_inner(previous)
            }
        } else {
            current
        };

        let value = pipeline.run(ctx)?;
        if ctx.is_faulted() { None } else { Some(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_guard_limits_nesting() {
        let outer = OperationGuard::enter(2).unwrap();
        let inner = OperationGuard::enter(2).unwrap();
        assert!(OperationGuard::enter(2).is_none());
        drop(inner);
        assert!(OperationGuard::enter(2).is_some());
        drop(outer);
    }

    #[derive(Debug)]
    struct Noop;
    impl BuildStrategy for Noop {}

    #[test]
    fn test_add_strategy_bumps_version() {
        let engine = Engine::new(ContainerOptions::default());
        let before = engine.chain_version();
        engine.add_strategy(Stage::PostInitialization, Arc::new(Noop));
        assert_eq!(engine.chain_version(), before + 1);
        assert_eq!(engine.chain().len(), 5);
    }
}

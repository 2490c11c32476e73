//! Build strategies and the staged strategy chain
//!
//! A build strategy contributes an optional pre-build and post-build hook.
//! Pre hooks run in stage order; post hooks run in reverse. The default
//! chain constructs the object, runs field, property and method
//! injection, then seals the result into the context's target slot.

use crate::inject::MemberKind;
use crate::{DiError, ResolutionContext};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Ordered stages of the build chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Setup,
    Lifetime,
    PreCreation,
    Creation,
    Fields,
    Properties,
    Methods,
    PostInitialization,
}

/// Which hooks a strategy takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hooks {
    pub pre: bool,
    pub post: bool,
}

impl Hooks {
    pub const BOTH: Hooks = Hooks { pre: true, post: true };
    pub const PRE: Hooks = Hooks { pre: true, post: false };
    pub const POST: Hooks = Hooks { pre: false, post: true };
}

/// One step of the build chain.
///
/// Hooks record failures with [`ResolutionContext::fail`]; nothing after a
/// fault runs.
pub trait BuildStrategy: Send + Sync + fmt::Debug {
    /// Hooks this strategy implements; others are never called
    fn hooks(&self) -> Hooks {
        Hooks::BOTH
    }

    fn pre_build_up(&self, _ctx: &mut ResolutionContext<'_>) {}

    fn post_build_up(&self, _ctx: &mut ResolutionContext<'_>) {}
}

// =============================================================================
// Built-in strategies
// =============================================================================

/// Creates the object in the pre hook and seals it in the post hook
#[derive(Debug, Default)]
pub struct ConstructorStrategy;

impl BuildStrategy for ConstructorStrategy {
    fn pre_build_up(&self, ctx: &mut ResolutionContext<'_>) {
        if ctx.has_existing() || ctx.target().is_some() {
            return;
        }
        let Some(recipe) = ctx.recipe().cloned() else {
            let err = DiError::not_found(ctx.contract());
            ctx.fail(err);
            return;
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "ioc_pipeline",
            type_name = recipe.key().name(),
            depth = ctx.depth(),
            "Constructing"
        );

        match recipe.construct(ctx) {
            Ok(obj) => ctx.set_existing(obj),
            Err(e) => ctx.fail(e),
        }
    }

    fn post_build_up(&self, ctx: &mut ResolutionContext<'_>) {
        let Some(obj) = ctx.take_existing() else {
            return;
        };
        let sealed = ctx.recipe().and_then(|recipe| recipe.seal(obj));
        match sealed {
            Some(value) => ctx.set_target(value),
            None => {
                let err = DiError::TypeMismatch {
                    expected: ctx.contract().key().name(),
                };
                ctx.fail(err);
            }
        }
    }
}

/// Runs one kind of member injector against the object under construction
#[derive(Debug)]
pub struct MemberStrategy {
    kind: MemberKind,
}

impl MemberStrategy {
    pub fn new(kind: MemberKind) -> Self {
        Self { kind }
    }
}

impl BuildStrategy for MemberStrategy {
    fn hooks(&self) -> Hooks {
        Hooks::PRE
    }

    fn pre_build_up(&self, ctx: &mut ResolutionContext<'_>) {
        let Some(recipe) = ctx.recipe().cloned() else {
            return;
        };
        if !recipe.has_members(self.kind) {
            return;
        }
        let Some(mut obj) = ctx.take_existing() else {
            return;
        };

        let result = recipe.inject(self.kind, obj.as_mut(), ctx);
        ctx.set_existing(obj);
        if let Err(e) = result {
            ctx.fail(e);
        }
    }
}

// =============================================================================
// Strategy chain
// =============================================================================

/// Immutable staged list of strategies with a version.
///
/// Adding a strategy produces a new chain with a higher version; pipelines
/// built against an older version are rebuilt on next use.
#[derive(Debug, Clone)]
pub struct StrategyChain {
    entries: Vec<(Stage, Arc<dyn BuildStrategy>)>,
    version: u64,
}

impl StrategyChain {
    /// Empty chain
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            version: 0,
        }
    }

    /// Constructor plus field, property and method injection
    pub fn standard() -> Self {
        Self::empty()
            .with(Stage::Creation, Arc::new(ConstructorStrategy))
            .with(Stage::Fields, Arc::new(MemberStrategy::new(MemberKind::Field)))
            .with(
                Stage::Properties,
                Arc::new(MemberStrategy::new(MemberKind::Property)),
            )
            .with(Stage::Methods, Arc::new(MemberStrategy::new(MemberKind::Method)))
    }

    /// New chain with `strategy` appended to `stage`
    pub fn with(&self, stage: Stage, strategy: Arc<dyn BuildStrategy>) -> Self {
        let mut entries = self.entries.clone();
        let at = entries.partition_point(|(s, _)| *s <= stage);
        entries.insert(at, (stage, strategy));
        Self {
            entries,
            version: self.version + 1,
        }
    }

    /// Strategies in stage order
    pub fn strategies(&self) -> Vec<Arc<dyn BuildStrategy>> {
        self.entries.iter().map(|(_, s)| Arc::clone(s)).collect()
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::standard()
    }
}

//! Pipelines and the builders that turn strategy chains into them
//!
//! A pipeline is a callable `(context) -> Option<Value>`. `None` means no
//! value was produced; when the context is faulted the fault explains why.
//!
//! Three interchangeable builders produce observably identical pipelines
//! from the same strategy chain:
//!
//! - [`PipelineKind::Iterated`] walks the strategy array with an index,
//!   forward through pre hooks and backward through post hooks
//! - [`PipelineKind::Compiled`] flattens the participating hooks into one
//!   call list ahead of time
//! - [`PipelineKind::Resolved`] nests one closure per strategy, each
//!   wrapping the rest of the chain

use crate::strategy::{BuildStrategy, Hooks};
use crate::{ResolutionContext, Value};
use std::fmt;
use std::sync::Arc;

/// Shared pipeline body
pub type Step = Arc<dyn Fn(&mut ResolutionContext<'_>) -> Option<Value> + Send + Sync>;

/// A built, cacheable resolution pipeline.
///
/// Pipelines carry the strategy-chain version they were built against;
/// a cached pipeline whose version no longer matches is rebuilt. Pinned
/// pipelines never go stale.
pub struct Pipeline {
    label: &'static str,
    version: Option<u64>,
    run: Step,
}

impl Pipeline {
    /// Pipeline built against chain `version`
    pub fn new<F>(label: &'static str, version: u64, run: F) -> Self
    where
        F: Fn(&mut ResolutionContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            label,
            version: Some(version),
            run: Arc::new(run),
        }
    }

    /// Pipeline independent of the strategy chain
    pub fn pinned<F>(label: &'static str, run: F) -> Self
    where
        F: Fn(&mut ResolutionContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            label,
            version: None,
            run: Arc::new(run),
        }
    }

    /// Execute against a context
    #[inline]
    pub fn run(&self, ctx: &mut ResolutionContext<'_>) -> Option<Value> {
        (self.run)(ctx)
    }

    /// What produced this pipeline
    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Chain version, `None` when pinned
    #[inline]
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    #[inline]
    pub(crate) fn is_current(&self, version: u64) -> bool {
        self.version.is_none_or(|v| v == version)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("label", &self.label)
            .field("version", &self.version)
            .finish()
    }
}

/// Which builder turns strategy chains into pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineKind {
    Iterated,
    Compiled,
    #[default]
    Resolved,
}

impl PipelineKind {
    /// Build a pipeline body over `strategies`
    pub fn build(self, strategies: &[Arc<dyn BuildStrategy>]) -> Step {
        let chain: Vec<(Arc<dyn BuildStrategy>, Hooks)> = strategies
            .iter()
            .map(|s| (Arc::clone(s), s.hooks()))
            .filter(|(_, hooks)| hooks.pre || hooks.post)
            .collect();

        match self {
            PipelineKind::Iterated => iterated(chain),
            PipelineKind::Compiled => compiled(chain),
            PipelineKind::Resolved => resolved(chain),
        }
    }
}

#[inline]
fn finish(ctx: &mut ResolutionContext<'_>) -> Option<Value> {
    if ctx.is_faulted() {
        None
    } else {
        ctx.take_target()
    }
}

fn iterated(chain: Vec<(Arc<dyn BuildStrategy>, Hooks)>) -> Step {
    let chain: Arc<[(Arc<dyn BuildStrategy>, Hooks)]> = chain.into();

    Arc::new(move |ctx: &mut ResolutionContext<'_>| {
        let mut i = 0;
        while i < chain.len() && !ctx.is_faulted() {
            let (strategy, hooks) = &chain[i];
            if hooks.pre {
                strategy.pre_build_up(ctx);
            }
            i += 1;
        }
        while i > 0 && !ctx.is_faulted() {
            i -= 1;
            let (strategy, hooks) = &chain[i];
            if hooks.post {
                strategy.post_build_up(ctx);
            }
        }
        finish(ctx)
    })
}

enum Call {
    Pre(Arc<dyn BuildStrategy>),
    Post(Arc<dyn BuildStrategy>),
}

fn compiled(chain: Vec<(Arc<dyn BuildStrategy>, Hooks)>) -> Step {
    let pre = chain
        .iter()
        .filter(|(_, hooks)| hooks.pre)
        .map(|(s, _)| Call::Pre(Arc::clone(s)));
    let post = chain
        .iter()
        .rev()
        .filter(|(_, hooks)| hooks.post)
        .map(|(s, _)| Call::Post(Arc::clone(s)));
    let calls: Box<[Call]> = pre.chain(post).collect();

    Arc::new(move |ctx: &mut ResolutionContext<'_>| {
        for call in calls.iter() {
            match call {
                Call::Pre(strategy) => strategy.pre_build_up(ctx),
                Call::Post(strategy) => strategy.post_build_up(ctx),
            }
            if ctx.is_faulted() {
                return None;
            }
        }
        finish(ctx)
    })
}

type Nested = Arc<dyn Fn(&mut ResolutionContext<'_>) + Send + Sync>;

fn resolved(chain: Vec<(Arc<dyn BuildStrategy>, Hooks)>) -> Step {
    let mut next: Option<Nested> = None;

    for (strategy, hooks) in chain.into_iter().rev() {
        let downstream = next.take();
        next = Some(Arc::new(move |ctx: &mut ResolutionContext<'_>| {
            if hooks.pre {
                strategy.pre_build_up(ctx);
                if ctx.is_faulted() {
                    return;
                }
            }
            if let Some(downstream) = &downstream {
                downstream(ctx);
                if ctx.is_faulted() {
                    return;
                }
            }
            if hooks.post {
                strategy.post_build_up(ctx);
            }
        }));
    }

    match next {
        Some(head) => Arc::new(move |ctx: &mut ResolutionContext<'_>| {
            head(ctx);
            finish(ctx)
        }),
        None => Arc::new(finish),
    }
}

//! Pipeline factories
//!
//! The dispatcher picks a pipeline for a registration based on its
//! category. Type registrations get a pipeline built from the strategy
//! chain; instances, factories and the on-demand activator share one
//! pinned pipeline each, since everything they need is read from the
//! context at run time.

use crate::engine::Engine;
use crate::pipeline::Pipeline;
use crate::registration::{Category, Converter, CreationPolicy, RegistrationManager};
use crate::{DiError, Plan, Recipe, ResolutionContext, TypeKey, Value};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Choose the pipeline for a registration
pub(crate) fn dispatch(
    engine: &Engine,
    ctx: &ResolutionContext<'_>,
    manager: &Arc<RegistrationManager>,
) -> Arc<Pipeline> {
    let version = engine.chain_version();
    let Some(origin) = manager.origin() else {
        return Arc::new(released(version));
    };

    #[cfg(feature = "logging")]
    trace!(
        target: "ioc_pipeline",
        contract = %manager.contract(),
        category = origin.category().name(),
        "Dispatching pipeline"
    );

    match origin.category() {
        Category::Uninitialized => from_plan(engine, ctx.plan()),
        Category::Internal => {
            unreachable!("internal registrations carry a prebuilt pipeline")
        }
        Category::Type {
            implementation,
            recipe,
            plan,
            convert,
            require_build,
        } => match convert {
            Some(convert) if !require_build => {
                Arc::new(mapping(version, *implementation, *plan, Arc::clone(convert)))
            }
            _ => from_type(engine, Arc::clone(recipe), convert.clone(), origin.policy()),
        },
        Category::Instance(_) => engine.instance(),
        Category::Factory(_) => engine.factory(),
        Category::Clone(_) => Arc::new(released(version)),
    }
}

/// Pipeline that runs the strategy chain over `recipe`
pub(crate) fn from_type(
    engine: &Engine,
    recipe: Arc<Recipe>,
    convert: Option<Converter>,
    policy: CreationPolicy,
) -> Arc<Pipeline> {
    if policy == CreationPolicy::Shared {
        return engine.activate();
    }

    let chain = engine.chain();
    let body = engine.options().pipeline_kind.build(&chain.strategies());

    Arc::new(Pipeline::new("type", chain.version(), move |ctx| {
        ctx.set_recipe(Arc::clone(&recipe));
        let value = body(ctx)?;
        match &convert {
            None => Some(value),
            Some(convert) => convert_or_fail(ctx, convert, value),
        }
    }))
}

/// Pipeline for an unregistered type's plan
pub(crate) fn from_plan(engine: &Engine, plan: Plan) -> Arc<Pipeline> {
    match plan {
        Plan::Construct(recipe) => from_type(engine, recipe, None, CreationPolicy::Any),
        Plan::Pattern(pattern) => Arc::new(pattern.pipeline(engine.chain_version())),
        Plan::Unresolvable => Arc::new(unresolvable(engine.chain_version())),
    }
}

fn convert_or_fail(
    ctx: &mut ResolutionContext<'_>,
    convert: &Converter,
    value: Value,
) -> Option<Value> {
    match convert(value) {
        Some(value) => Some(value),
        None => {
            let err = DiError::TypeMismatch {
                expected: ctx.contract().key().name(),
            };
            ctx.fail(err);
            None
        }
    }
}

/// Resolve the implementation contract and convert it to the registered type
fn mapping(
    version: u64,
    implementation: TypeKey,
    plan: fn() -> Plan,
    convert: Converter,
) -> Pipeline {
    Pipeline::new("mapping", version, move |ctx| {
        let contract = ctx.contract().map(implementation);
        match ctx.resolve_contract(contract, plan) {
            Ok(value) => convert_or_fail(ctx, &convert, value),
            Err(e) => {
                ctx.fail(e);
                None
            }
        }
    })
}

fn unresolvable(version: u64) -> Pipeline {
    Pipeline::new("unresolvable", version, |ctx| {
        let err = DiError::not_found(ctx.contract());
        ctx.fail(err);
        None
    })
}

fn released(version: u64) -> Pipeline {
    Pipeline::new("released", version, |ctx| {
        let err = DiError::InstanceReleased {
            contract: ctx.contract().to_string(),
        };
        ctx.fail(err);
        None
    })
}

/// Builds and runs a pipeline from whatever the context describes, on
/// every call, without caching it anywhere
pub(crate) fn activate() -> Pipeline {
    Pipeline::pinned("activate", |ctx| {
        let engine = ctx.scope().engine();
        let origin = ctx.registration().and_then(|manager| manager.origin());

        let pipeline = match origin.as_ref().map(|origin| origin.category()) {
            Some(Category::Type { recipe, convert, .. }) => from_type(
                engine,
                Arc::clone(recipe),
                convert.clone(),
                CreationPolicy::NonShared,
            ),
            _ => from_plan(engine, ctx.plan()),
        };
        pipeline.run(ctx)
    })
}

/// Returns the pre-built instance of the registration, or of the parent
/// registration a scope copy was made from.
///
/// Only reached on a lifetime miss: either a scope that has not cached the
/// instance yet, or an instance whose owner let it go.
pub(crate) fn instance() -> Pipeline {
    Pipeline::pinned("instance", |ctx| {
        let origin = ctx.registration().and_then(|manager| manager.origin());
        let held = match origin.as_ref().map(|origin| origin.category()) {
            Some(Category::Instance(instance)) => instance.upgrade(),
            _ => None,
        };

        if held.is_none() {
            ctx.fail(DiError::InstanceReleased {
                contract: ctx.contract().to_string(),
            });
        }
        held
    })
}

/// Invokes the registration's factory delegate
pub(crate) fn factory() -> Pipeline {
    Pipeline::pinned("factory", |ctx| {
        let delegate = ctx
            .registration()
            .and_then(|manager| manager.origin())
            .and_then(|origin| match origin.category() {
                Category::Factory(delegate) => Some(Arc::clone(delegate)),
                _ => None,
            });

        let Some(delegate) = delegate else {
            let err = DiError::not_found(ctx.contract());
            ctx.fail(err);
            return None;
        };

        match delegate(ctx.container(), ctx.contract()) {
            Ok(value) => Some(value),
            Err(e) => {
                ctx.fail(e);
                None
            }
        }
    })
}

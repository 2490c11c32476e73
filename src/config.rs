//! Container configuration

use crate::PipelineKind;
use std::time::Duration;

/// Default time a resolving thread waits on another thread's construction
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit on nested resolutions
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Options fixed when a root container is created and shared by all of
/// its child scopes.
///
/// # Examples
///
/// ```rust
/// use ioc_pipeline::{Container, ContainerOptions, PipelineKind};
/// use std::time::Duration;
///
/// let container = Container::with_options(
///     ContainerOptions::new()
///         .resolve_timeout(Duration::from_secs(2))
///         .pipeline_kind(PipelineKind::Compiled),
/// );
/// assert_eq!(container.options().resolve_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// How long synchronized lifetime managers block before faulting
    pub resolve_timeout: Duration,
    /// Which builder turns strategy chains into pipelines
    pub pipeline_kind: PipelineKind,
    /// Nested resolutions allowed before faulting with a depth error
    pub max_depth: usize,
    /// Pre-allocated registry slots per scope
    pub initial_capacity: usize,
}

impl ContainerOptions {
    /// Defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resolve timeout
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Set the pipeline builder
    pub fn pipeline_kind(mut self, kind: PipelineKind) -> Self {
        self.pipeline_kind = kind;
        self
    }

    /// Set the depth limit
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the registry capacity
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            pipeline_kind: PipelineKind::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            initial_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ContainerOptions::default();
        assert_eq!(options.resolve_timeout, Duration::from_secs(10));
        assert_eq!(options.pipeline_kind, PipelineKind::Resolved);
        assert_eq!(options.max_depth, 256);
    }
}

//! Subscriber setup for the container's `tracing` events
//!
//! Every event the container emits uses the `ioc_pipeline` target:
//!
//! - `DEBUG` for container lifecycle: scopes created and disposed,
//!   registrations added, generic registrations closed, failed resolves
//! - `TRACE` for the hot path: each resolve, pipeline dispatch and
//!   pipeline caching
//!
//! Installing a subscriber requires `logging-pretty` or `logging-json`;
//! without either the initializers do nothing and report `false`.
//!
//! ```rust,ignore
//! use ioc_pipeline::logging;
//!
//! logging::builder()
//!     .trace()
//!     .container_only()
//!     .with_thread_ids()
//!     .pretty()
//!     .init();
//! ```

use tracing::Level;

/// Target of every event emitted by this crate
pub const TARGET: &str = "ioc_pipeline";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event; falls back to compact without `logging-json`
    Json,
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    container_only: bool,
    thread_ids: bool,
    source_location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            container_only: false,
            thread_ids: false,
            source_location: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Include per-resolve events
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Lifecycle events only
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Drop events from other crates
    pub fn container_only(mut self) -> Self {
        self.container_only = true;
        self
    }

    /// Resolves contend on lifetime gates; thread ids show who waited on whom
    pub fn with_thread_ids(mut self) -> Self {
        self.thread_ids = true;
        self
    }

    /// Include file and line of each event
    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    fn directive(&self) -> String {
        if self.container_only {
            format!("{}={}", TARGET, self.level)
        } else {
            self.level.to_string()
        }
    }

    /// Install the global subscriber.
    ///
    /// Returns `false` if one was already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.directive());
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(self.thread_ids)
            .with_file(self.source_location)
            .with_line_number(self.source_location);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer.compact()).try_init(),
        };
        installed.is_ok()
    }

    /// No subscriber backend is compiled in
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) -> bool {
        false
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a subscriber for this crate's lifecycle events.
///
/// JSON when `logging-json` is enabled, pretty otherwise.
pub fn init() -> bool {
    let builder = builder().container_only();
    if cfg!(feature = "logging-json") {
        builder.json().init()
    } else {
        builder.pretty().init()
    }
}

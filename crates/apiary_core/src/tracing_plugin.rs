//! Tracing and observability plugin.
//!
//! Provides [`TracingPlugin`] which configures the `tracing` subscriber and
//! exposes its configuration as global state.
//!
//! # Lifecycle
//!
//! - **`build()`** inserts the [`TracingConfig`] global so other plugins can
//!   read the intended configuration while they build.
//! - **`ready()`** installs the subscriber, unless the host already
//!   installed one.
//!
//! # Example
//!
//! ```
//! use apiary_core::{TracingFormat, TracingPlugin};
//! use apiary_system::server::Server;
//! use tracing::Level;
//!
//! let mut server = Server::new();
//! server.add_plugins(
//!     TracingPlugin::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact),
//! );
//! server.finish();
//! ```

use apiary_system::plugin::Plugin;
use apiary_system::server::Server;
use apiary_system::state::GlobalState;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// The tracing configuration, published as global state.
///
/// Storage handles and API group plugins can read it to decide whether
/// expensive diagnostics are worth computing:
///
/// ```
/// use apiary_core::TracingConfig;
/// use apiary_system::server::Server;
/// use tracing::Level;
///
/// fn log_routes(server: &Server) {
///     let verbose = server
///         .get_global::<TracingConfig>()
///         .is_some_and(|config| config.level >= Level::DEBUG);
///     if verbose {
///         tracing::debug!("dumping the route table");
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    /// The configured maximum level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
}

impl GlobalState for TracingConfig {}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing and logging plugin.
///
/// # State Provided
///
/// | State | Scope | Description |
/// |-------|-------|-------------|
/// | [`TracingConfig`] | Global | Tracing configuration (read-only) |
///
/// # Environment Filter
///
/// `with_env_filter` sets per-target levels, overriding `with_level`:
///
/// ```
/// use apiary_core::TracingPlugin;
///
/// TracingPlugin::default()
///     .with_env_filter("apiary_builder=debug,apiary_storage=warn")
/// # ;
/// ```
///
/// An invalid filter falls back to the configured level.
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    level: Level,
    format: TracingFormat,
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Creates a new `TracingPlugin` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a filter directive string, `target=level,target=level,...`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_global(TracingConfig {
            level: self.level,
            format: self.format,
        });
    }

    fn ready(&self, _server: &mut Server) {
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init fails if a subscriber is already installed.
        let registry = tracing_subscriber::registry().with(self.filter());
        match self.format {
            TracingFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_span_events(span_events))
                .try_init()
                .ok(),
            TracingFormat::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact().with_span_events(span_events))
                .try_init()
                .ok(),
            TracingFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_span_events(span_events))
                .try_init()
                .ok(),
        };

        tracing::info!(level = %self.level, format = ?self.format, "tracing initialized");
    }

    fn cleanup(&self, _server: &mut Server) {
        tracing::info!("tracing shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let plugin = TracingPlugin::default();
        assert_eq!(plugin.level, Level::INFO);
        assert_eq!(plugin.format, TracingFormat::Pretty);
        assert!(plugin.env_filter.is_none());
        assert!(!plugin.span_events);
    }

    #[test]
    fn builder_methods() {
        let plugin = TracingPlugin::new()
            .with_level(Level::DEBUG)
            .with_format(TracingFormat::Json)
            .with_env_filter("apiary_builder=debug")
            .with_span_events(true);
        assert_eq!(plugin.level, Level::DEBUG);
        assert_eq!(plugin.format, TracingFormat::Json);
        assert_eq!(plugin.env_filter.as_deref(), Some("apiary_builder=debug"));
        assert!(plugin.span_events);
    }

    #[test]
    fn invalid_filter_falls_back_to_level() {
        let plugin = TracingPlugin::new()
            .with_level(Level::WARN)
            .with_env_filter("apiary_builder=loud");
        assert_eq!(plugin.filter().max_level_hint(), Some(Level::WARN.into()));
    }

    #[test]
    fn publishes_config() {
        let mut server = Server::new();
        server.add_plugins(TracingPlugin::default().with_format(TracingFormat::Compact));
        server.finish();

        let config = server.get_global::<TracingConfig>().unwrap();
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.level, Level::INFO);
    }
}

//! # Observability
//!
//! Installs a `tracing` subscriber for the `llm-agentkit` targets. Every
//! pipeline stage runs inside a `trace_scope` span carrying the run's
//! `request_id`, so a single run can be followed across selection, tool
//! calls and response generation.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level captured for this crate.
    pub level: Level,
    /// Where log lines are written.
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    fn directive(&self) -> String {
        format!("llm_agentkit={}", self.level)
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file, truncating it first.
    File(String),
}

/// Installs the global tracing subscriber.
///
/// Call once near the start of `main`. `RUST_LOG` directives are honored in
/// addition to the configured level.
///
/// # Errors
///
/// Fails when the log file cannot be created or when a global subscriber is
/// already installed.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive(config.directive().parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_writer(file).with_ansi(false);
            subscriber.with(layer).try_init()?;
        }
    };

    Ok(())
}

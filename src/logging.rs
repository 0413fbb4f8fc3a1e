//! Logging capability handed to the planner, and subscriber setup for the CLI

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Leveled log sink injected into a planner at construction
pub trait PlanLogger: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn enabled(&self, _level: Level) -> bool {
        true
    }
}

/// Forwards planner messages to `tracing` under the `autocache::planner` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PlanLogger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "autocache::planner", "{}", message),
            Level::WARN => tracing::warn!(target: "autocache::planner", "{}", message),
            Level::INFO => tracing::info!(target: "autocache::planner", "{}", message),
            Level::DEBUG => tracing::debug!(target: "autocache::planner", "{}", message),
            _ => tracing::trace!(target: "autocache::planner", "{}", message),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl PlanLogger for NullLogger {
    fn log(&self, _level: Level, _message: &str) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}

pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

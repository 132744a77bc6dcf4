//! Diagnostic tracing for the wizard.
//!
//! Tracing output goes to stderr and is separate from the operator
//! conversation, which always goes through the console.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_LEVEL_ENV: &str = "WIZARD_LOG_LEVEL";
pub const DEFAULT_LOG_LEVEL: &str = "error";

/// Initialize the tracing subscriber.
///
/// Precedence: `--log-level`, then `RUST_LOG`, then `WIZARD_LOG_LEVEL`,
/// then `error`. Output: stderr, compact format.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(normalize_level(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
            EnvFilter::new(normalize_level(&level))
        }),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Accept the conventional level names in any case.
pub fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => DEFAULT_LOG_LEVEL.to_string(),
        other => other.to_string(),
    }
}

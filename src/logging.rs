//! # Structured Logging
//!
//! Environment-aware tracing initialization. Honors `RUST_LOG`, falls back
//! to an environment-specific default level, and optionally switches to
//! JSON output for log aggregation.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call from
/// multiple entry points; a pre-existing global subscriber is left alone.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment =
            std::env::var("ROWMQ_ENV").unwrap_or_else(|_| "development".to_string());
        let default_level = if environment == "production" {
            "info"
        } else {
            "debug"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("rowmq={default_level}")));

        let json_output = std::env::var("ROWMQ_LOG_FORMAT")
            .map(|format| format == "json")
            .unwrap_or(false);

        let registry = tracing_subscriber::registry().with(filter);
        let initialized = if json_output {
            registry
                .with(fmt::layer().json().with_target(true))
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(true)).try_init()
        };

        if initialized.is_err() {
            // A global subscriber is already set by the host; keep it.
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}

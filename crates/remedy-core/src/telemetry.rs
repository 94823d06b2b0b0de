//! Tracing subscriber setup for processes embedding the engine.
//!
//! The engine only emits events; installing a subscriber is the embedder's
//! choice. [`init_tracing`] is the default setup and may be called more than
//! once (later calls are no-ops).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "REMEDY_LOG";

/// Install a global subscriber.
///
/// Filtering comes from `REMEDY_LOG`, then `RUST_LOG`, then `level`. With
/// `json` set, lines are newline-delimited JSON for log pipelines.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

//! # Logging configuration
//!
//! Two initializers matching the pattern the rest of this codebase's crates use: a
//! human-readable formatter for local/dev use, and a JSON formatter for log aggregators. Both are
//! driven by the `RUST_LOG` environment variable via `EnvFilter`, and both should be installed
//! exactly once at process start.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("hub starting");
//! }
//! ```
//!
//! ```bash
//! export RUST_LOG=hub_core=debug,hub_data=info
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes human-readable logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initializes JSON logging, for consumption by log aggregators.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}

//! Blobstream Observability
//!
//! Provides metrics and logging for Blobstream.
//!
//! # Features
//!
//! - Prometheus metrics registry for producers, consumers, leases and blob requests
//! - Structured logging with tracing
//!
//! # Usage
//!
//! ```no_run
//! use blobstream_observability::{init_tracing, metrics};
//!
//! init_tracing();
//! metrics::init();
//!
//! let exposition = metrics::render().unwrap();
//! println!("{}", exposition);
//! ```

pub mod metrics;

// Re-export commonly used items
pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
    init_tracing();
}

/// Install a global `tracing` subscriber driven by `RUST_LOG` (default: `info`).
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

//! Tracing setup for the engine.
//!
//! `loomgraph` does not configure logging as a side effect of being linked;
//! embedding applications call [`init_tracing`] once at startup, leaving
//! subscriber installation to the binary.

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global `tracing` subscriber reading `RUST_LOG` (default `info`),
/// with ANSI formatting and span-trace capture for `miette` error reports.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .try_init()
}

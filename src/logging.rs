//! Tracing subscriber setup
//!
//! The engine only emits `tracing` events; callers decide whether to install
//! a subscriber. `RUST_LOG` filters apply on top of the default level.

use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber
///
/// `debug` raises the default level from INFO to TRACE. Safe to call more
/// than once: later calls leave the first subscriber in place and return
/// `false`.
pub fn init_tracing(debug: bool) -> bool {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

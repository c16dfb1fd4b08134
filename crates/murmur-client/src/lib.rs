//! # murmur-client
//!
//! The client facade for the murmur sync engine.
//!
//! [`MurmurClient`] wires the stream core together and exposes the surface an
//! embedding application needs:
//!
//! - `sign_in` / `sign_out` for credential management
//! - `set_streaming_ready` (the online/offline gate), `start_streaming`,
//!   `stop_streaming`
//! - read access to the replicated channels and user directory
//! - a broadcast channel of upward [`Signal`]s ("replica ready",
//!   "auth invalidated")
//!
//! Configuration loads from compiled defaults, `~/.murmur/settings.json`,
//! and `MURMUR_*` environment variables, in that order.
//!
//! [`Signal`]: murmur_stream::Signal

#![deny(unsafe_code)]

pub mod client;
pub mod config;

pub use client::MurmurClient;
pub use config::{load_config, ClientConfig, ConfigError};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for binaries embedding the client.
///
/// Honors `RUST_LOG`; defaults to info-level output for the murmur crates.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("murmur_client=info,murmur_stream=info,murmur_replica=info,warn")
    });
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

//! HTTP front-end for `tuf-gate`.
//!
//! Loads a metadata repository from disk, answers nginx `auth_request`
//! sub-requests against it, and reloads it on SIGHUP or on an interval.

pub mod config;
pub mod generate;
pub mod reload;
pub mod repository;
pub mod server;

pub use config::Config;
pub use server::Server;

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

//! Data-access layer of the Atelier creative workspace.
//!
//! Commands in [`commands`] operate on a [`state::SharedState`] holding the
//! database, the blob store, the auth session and the audio player.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod session;
pub mod state;
pub mod tree;

use tracing_subscriber::{fmt, EnvFilter};

pub use error::{ClientError, Result};

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("atelier_client=debug,atelier_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

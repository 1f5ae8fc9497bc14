//! debugd: a local debug relay
//!
//! Profilers connect over TCP and send a `DEBUGD\nPROFILE\n` header,
//! a folded-stack profile and a NUL terminator. The relay writes the
//! profile to a temporary file and opens it in an external viewer.
//!
//! Features:
//! - Sequential or concurrent connection handling
//! - Bounded request size
//! - Configuration via CLI arguments or TOML file

mod config;
mod dispatch;
mod error;
mod handler;
mod protocol;
mod server;

use config::Config;
use server::Server;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    debug!(
        listen = %config.listen,
        mode = ?config.mode,
        viewer = %config.viewer.display(),
        max_request_size = config.max_request_size,
        "Starting debugd"
    );

    let server = Server::bind(&config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}

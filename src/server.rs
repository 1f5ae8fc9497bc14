//! TCP listener for incoming profiles.
//!
//! Accepts connections and passes each one to the [`Handler`]. A failure on
//! one connection is logged and never stops the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::{Config, ServeMode};
use crate::error::HandlerError;
use crate::handler::{Handler, Outcome};

/// Server instance
pub struct Server {
    listener: TcpListener,
    handler: Arc<Handler>,
    mode: ServeMode,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the configured address.
    ///
    /// A bind failure is returned to the caller; the process cannot do
    /// anything useful without its socket.
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.listen).await?;

        Ok(Server {
            listener,
            handler: Arc::new(Handler::from_config(config)),
            mode: config.mode,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self) -> std::io::Result<()> {
        info!(address = %self.local_addr()?, mode = ?self.mode, "Server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };
            debug!(peer = %peer, "New connection");

            match self.mode {
                ServeMode::Sequential => {
                    serve_connection(&self.handler, stream, peer).await;
                }
                ServeMode::Concurrent => {
                    // Wait for a connection slot
                    let permit = Arc::clone(&self.connection_limit)
                        .acquire_owned()
                        .await
                        .map_err(std::io::Error::other)?;
                    let handler = Arc::clone(&self.handler);

                    tokio::spawn(async move {
                        serve_connection(&handler, stream, peer).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

/// Run the handler for one connection and log how it ended.
async fn serve_connection(handler: &Handler, mut stream: TcpStream, peer: SocketAddr) {
    match handler.handle(&mut stream, peer).await {
        Ok(Outcome::Dispatched { artifact, status }) => {
            debug!(peer = %peer, artifact = %artifact.display(), status = %status, "Connection done");
        }
        Ok(Outcome::Rejected(reason)) => {
            debug!(peer = %peer, reason = %reason, "Connection rejected");
        }
        Err(HandlerError::Incomplete { received }) => {
            debug!(peer = %peer, received, "Connection closed before terminator");
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "Connection failed");
        }
    }
}

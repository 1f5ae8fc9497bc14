//! Per-connection request handling.
//!
//! A connection moves through `AWAITING_DATA -> COMPLETE` while bytes are
//! read, then ends either `DISPATCHED` (artifact written, viewer exited) or
//! `REJECTED` (header invalid, nothing written). Each connection is handled
//! exactly once.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::dispatch::{ArtifactStore, Viewer};
use crate::error::{FrameError, HandlerError};
use crate::protocol::Request;

/// Read chunk size
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Terminal state of a handled connection.
#[derive(Debug)]
pub enum Outcome {
    /// The payload was written and the viewer ran to completion.
    Dispatched {
        /// Artifact handed to the viewer.
        artifact: PathBuf,
        /// Viewer exit status.
        status: ExitStatus,
    },
    /// The request was malformed. No artifact exists.
    Rejected(FrameError),
}

/// Receive-validate-dispatch protocol for a single connection.
#[derive(Debug, Clone)]
pub struct Handler {
    artifacts: ArtifactStore,
    viewer: Viewer,
    max_request_size: usize,
}

impl Handler {
    /// Create a handler from its parts.
    pub fn new(artifacts: ArtifactStore, viewer: Viewer, max_request_size: usize) -> Self {
        Self {
            artifacts,
            viewer,
            max_request_size,
        }
    }

    /// Create a handler from resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ArtifactStore::new(
                config.artifact_dir.clone(),
                config.artifact_prefix.clone(),
                config.artifact_suffix.clone(),
            ),
            Viewer::new(config.viewer.clone(), config.viewer_args.clone()),
            config.max_request_size,
        )
    }

    /// Handle one connection from `peer`.
    ///
    /// Returns once the request was rejected or the viewer has exited. A
    /// peer that never sends the terminator keeps this pending forever.
    pub async fn handle<R>(&self, stream: &mut R, peer: SocketAddr) -> Result<Outcome, HandlerError>
    where
        R: AsyncRead + Unpin,
    {
        let request = self.receive(stream).await?;
        debug!(peer = %peer, bytes = request.len(), "Request complete");

        let frame = match request.into_frame() {
            Ok(frame) => frame,
            Err(err) => {
                match &err {
                    FrameError::InvalidKind { kind } => {
                        warn!(peer = %peer, kind = %kind, "Invalid request");
                    }
                    _ => warn!(peer = %peer, "Invalid header"),
                }
                return Ok(Outcome::Rejected(err));
            }
        };

        let kind = frame.kind();
        let bytes = frame.payload().len();
        let payload = frame.into_payload();

        let store = self.artifacts.clone();
        let artifact = tokio::task::spawn_blocking(move || store.write(&payload))
            .await
            .map_err(|e| HandlerError::Artifact(std::io::Error::other(e)))?
            .map_err(HandlerError::Artifact)?;
        info!(
            peer = %peer,
            kind = kind.as_str(),
            artifact = %artifact.display(),
            bytes,
            "Payload received"
        );

        let status = self.viewer.open(&artifact).await?;
        if status.success() {
            debug!(peer = %peer, "Viewer exited");
        } else {
            warn!(peer = %peer, status = %status, "Viewer exited with failure");
        }

        Ok(Outcome::Dispatched { artifact, status })
    }

    /// Accumulate chunks until one ends with the terminator.
    async fn receive<R>(&self, stream: &mut R) -> Result<Request, HandlerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut request = Request::new(self.max_request_size);
        let mut chunk = BytesMut::with_capacity(READ_CHUNK_SIZE);

        while !request.is_complete() {
            chunk.clear();
            let n = stream.read_buf(&mut chunk).await?;
            if n == 0 {
                if request.is_empty() {
                    trace!("Connection closed without data");
                }
                return Err(HandlerError::Incomplete {
                    received: request.len(),
                });
            }

            request.append(&chunk)?;
            trace!(bytes = n, total = request.len(), "Read chunk");
        }

        Ok(request)
    }
}

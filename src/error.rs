//! Error types for the relay.
//!
//! Framing problems are reported as [`FrameError`] and buffer problems as
//! [`RequestError`]. Everything that can end a single connection is folded
//! into [`HandlerError`], which the listener logs and then discards.

use std::path::PathBuf;
use thiserror::Error;

/// A completed request whose header does not match the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The terminator byte has not been received yet.
    #[error("request is incomplete")]
    Incomplete,

    /// The text does not start with the `DEBUGD` marker.
    #[error("invalid header")]
    InvalidHeader,

    /// The marker is present but the message kind is not `PROFILE`.
    #[error("invalid request kind '{kind}'")]
    InvalidKind {
        /// The second line sent by the client.
        kind: String,
    },
}

/// Errors raised while accumulating request bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Appending the chunk would grow the buffer past its cap.
    #[error("payload too large: {received} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Bytes the buffer would hold after the append.
        received: usize,
        /// Configured maximum request size.
        limit: usize,
    },

    /// Data arrived after the terminator had already been seen.
    #[error("request already complete")]
    AlreadyComplete,
}

/// Errors that terminate the handling of one connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Reading from the socket failed.
    #[error("connection read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before sending the terminator.
    #[error("connection closed after {received} bytes without terminator")]
    Incomplete {
        /// Bytes accumulated before the close.
        received: usize,
    },

    /// The request exceeded the configured cap.
    #[error("payload too large (limit {limit} bytes)")]
    PayloadTooLarge {
        /// Configured maximum request size.
        limit: usize,
    },

    /// The artifact file could not be created or written.
    #[error("failed to write artifact: {0}")]
    Artifact(#[source] std::io::Error),

    /// The viewer could not be started or waited on.
    #[error("failed to run viewer '{program}': {source}")]
    Viewer {
        /// Viewer executable.
        program: PathBuf,
        /// Underlying spawn or wait error.
        #[source]
        source: std::io::Error,
    },
}

impl From<RequestError> for HandlerError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::TooLarge { limit, .. } => HandlerError::PayloadTooLarge { limit },
            // The read loop stops at the terminator, so this only happens
            // if a caller keeps feeding a finished request.
            RequestError::AlreadyComplete => HandlerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "data received after terminator",
            )),
        }
    }
}

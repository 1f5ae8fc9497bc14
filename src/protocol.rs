//! debugd wire protocol.
//!
//! A request is a small text header followed by an opaque payload and a
//! single NUL terminator:
//!
//! ```text
//! DEBUGD\n
//! PROFILE\n
//! <payload bytes>
//! \0
//! ```
//!
//! There is no length field. The request is complete when a chunk read
//! from the socket ends with the terminator byte. Nothing is ever written
//! back to the client.

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, RequestError};

/// Marker line every request starts with
pub const MARKER: &str = "DEBUGD";

/// The only message kind the relay accepts
pub const PROFILE_KIND: &str = "PROFILE";

/// Full header preceding the payload
pub const PREFIX: &str = "DEBUGD\nPROFILE\n";

/// End-of-message byte
pub const TERMINATOR: u8 = 0x00;

/// Port profilers connect to by default
pub const DEFAULT_PORT: u16 = 59336;

/// Message kinds understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Folded-stack profile to hand to the viewer.
    Profile,
}

impl MessageKind {
    /// Name of the kind as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Profile => PROFILE_KIND,
        }
    }
}

/// Bytes received on one connection so far.
///
/// The buffer is private to its connection and is bounded by `max_size`.
#[derive(Debug)]
pub struct Request {
    buffer: BytesMut,
    complete: bool,
    max_size: usize,
}

impl Request {
    /// Create an empty request that accepts at most `max_size` bytes,
    /// terminator included.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            complete: false,
            max_size,
        }
    }

    /// Append one chunk read from the connection.
    ///
    /// The request becomes complete when the chunk's last byte is the
    /// terminator. A NUL anywhere else in the chunk is ordinary data. An
    /// empty chunk leaves the request untouched.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), RequestError> {
        if self.complete {
            return Err(RequestError::AlreadyComplete);
        }

        let Some(&last) = chunk.last() else {
            return Ok(());
        };

        let received = self.buffer.len() + chunk.len();
        if received > self.max_size {
            return Err(RequestError::TooLarge {
                received,
                limit: self.max_size,
            });
        }

        self.buffer.extend_from_slice(chunk);
        self.complete = last == TERMINATOR;
        Ok(())
    }

    /// Whether the terminator has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of bytes accumulated, terminator included.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Parse the completed request into a frame.
    pub fn into_frame(self) -> Result<Frame, FrameError> {
        if !self.complete {
            return Err(FrameError::Incomplete);
        }

        let mut message = self.buffer;
        message.truncate(message.len() - 1); // drop terminator
        Frame::parse(message.freeze())
    }
}

/// A validated request, split into kind and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: MessageKind,
    payload: Bytes,
}

impl Frame {
    /// Validate the header of a message (terminator already removed) and
    /// split off the payload.
    ///
    /// The payload is everything after [`PREFIX`], kept byte-for-byte.
    pub fn parse(message: Bytes) -> Result<Frame, FrameError> {
        if !message.starts_with(MARKER.as_bytes()) {
            return Err(FrameError::InvalidHeader);
        }

        if !message.starts_with(PREFIX.as_bytes()) {
            return Err(FrameError::InvalidKind {
                kind: second_line(&message),
            });
        }

        Ok(Frame {
            kind: MessageKind::Profile,
            payload: message.slice(PREFIX.len()..),
        })
    }

    /// Message kind of this frame.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// The client's attempted message kind, for diagnostics.
fn second_line(message: &[u8]) -> String {
    message
        .split(|&b| b == b'\n')
        .nth(1)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(data: &[u8]) -> Request {
        let mut request = Request::new(1024);
        request.append(data).unwrap();
        assert!(request.is_complete());
        request
    }

    #[test]
    fn test_prefix_matches_parts() {
        assert_eq!(PREFIX, format!("{MARKER}\n{PROFILE_KIND}\n"));
        assert_eq!(MessageKind::Profile.as_str(), "PROFILE");
    }

    #[test]
    fn test_parse_profile() {
        let frame = complete(b"DEBUGD\nPROFILE\nthread 1;main 1\n\0")
            .into_frame()
            .unwrap();
        assert_eq!(frame.kind(), MessageKind::Profile);
        assert_eq!(frame.payload(), b"thread 1;main 1\n");
    }

    #[test]
    fn test_empty_payload() {
        let frame = complete(b"DEBUGD\nPROFILE\n\0").into_frame().unwrap();
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_payload_bytes_preserved() {
        let mut data = PREFIX.as_bytes().to_vec();
        let payload = "thread 7;résumé;日本 1\n".as_bytes().to_vec();
        data.extend_from_slice(&payload);
        data.extend_from_slice(&[0xff, 0xfe, 0x00, 0x80]);
        data.push(TERMINATOR);

        let frame = complete(&data).into_frame().unwrap();
        let mut expected = payload;
        expected.extend_from_slice(&[0xff, 0xfe, 0x00, 0x80]);
        assert_eq!(frame.payload(), expected.as_slice());
    }

    #[test]
    fn test_invalid_header() {
        let err = complete(b"HELLO\nPROFILE\ndata\0").into_frame().unwrap_err();
        assert_eq!(err, FrameError::InvalidHeader);
    }

    #[test]
    fn test_lowercase_marker_rejected() {
        let err = complete(b"debugd\nPROFILE\ndata\0").into_frame().unwrap_err();
        assert_eq!(err, FrameError::InvalidHeader);
    }

    #[test]
    fn test_invalid_kind() {
        let err = complete(b"DEBUGD\nWRONGKIND\ndata\0")
            .into_frame()
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidKind {
                kind: "WRONGKIND".to_string()
            }
        );
    }

    #[test]
    fn test_marker_without_kind() {
        let err = complete(b"DEBUGD\0").into_frame().unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidKind {
                kind: String::new()
            }
        );
    }

    #[test]
    fn test_kind_without_newline() {
        let err = complete(b"DEBUGD\nPROFILE\0").into_frame().unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidKind {
                kind: "PROFILE".to_string()
            }
        );
    }

    #[test]
    fn test_completes_only_on_trailing_nul() {
        let mut request = Request::new(1024);
        request.append(b"DEBUGD\nPRO\0FILE\n").unwrap();
        assert!(!request.is_complete());
        request.append(b"abc").unwrap();
        assert!(!request.is_complete());
        request.append(b"\0").unwrap();
        assert!(request.is_complete());
        assert_eq!(request.len(), 20);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut request = Request::new(16);
        request.append(b"").unwrap();
        assert!(request.is_empty());
        assert!(!request.is_complete());
    }

    #[test]
    fn test_incomplete_request_has_no_frame() {
        let mut request = Request::new(1024);
        request.append(b"DEBUGD\nPROFILE\ndata").unwrap();
        assert_eq!(request.into_frame().unwrap_err(), FrameError::Incomplete);
    }

    #[test]
    fn test_size_limit() {
        let mut request = Request::new(8);
        request.append(b"DEBUGD\n").unwrap();
        let err = request.append(b"PR").unwrap_err();
        assert_eq!(
            err,
            RequestError::TooLarge {
                received: 9,
                limit: 8
            }
        );
        assert_eq!(request.len(), 7);
    }

    #[test]
    fn test_append_after_complete() {
        let mut request = complete(b"DEBUGD\nPROFILE\n\0");
        assert_eq!(
            request.append(b"more").unwrap_err(),
            RequestError::AlreadyComplete
        );
    }
}

//! Wire-format definitions for the upload protocol.
//!
//! Every datagram the client sends is a [`Frame`].  This module is
//! responsible for:
//! - Classifying a raw inbound datagram as a control or data frame.
//! - Serialising a [`Frame`] into bytes ready for transmission.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! The protocol is datagram-oriented with a fixed maximum payload of
//! [`MAX_PAYLOAD`] bytes.  Control frames are textual, data frames are raw:
//!
//! | direction     | payload                | meaning                       |
//! |---------------|------------------------|-------------------------------|
//! | client→server | `META:FILENAME:<name>` | start a session for `<name>`  |
//! | client→server | raw bytes (≤1024)      | next in-order chunk           |
//! | client→server | `META:END`             | end of file; flush and close  |
//! | server→client | single byte [`ACK`]    | acknowledges the previous one |
//!
//! There is no session token and no sequence number on the wire; the server
//! attributes frames to a session by their source address.  A data chunk
//! whose first bytes happen to spell `META:` is classified as control — the
//! source protocol has no escaping, and neither do we.

/// Maximum bytes of a single datagram payload (control or data).
pub const MAX_PAYLOAD: usize = 1024;

/// The one-byte acknowledgment value sent server→client.
pub const ACK: u8 = 1;

/// Prefix shared by all control frames.
const META_PREFIX: &[u8] = b"META:";
/// Prefix of a session-start frame; the remainder is the requested name.
const FILENAME_PREFIX: &[u8] = b"META:FILENAME:";
/// The exact end-of-file marker.
const END_MARKER: &[u8] = b"META:END";

/// One classified client→server datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Start a session; carries the requested artifact base name.
    Start(String),
    /// End of file — flush and close the session.
    End,
    /// One in-order chunk of file content.
    Data(Vec<u8>),
}

impl Frame {
    /// Classify a raw datagram payload.
    ///
    /// Precedence: exact end marker, then filename prefix, then the bare
    /// `META:` prefix (an error — reserved but unrecognised), then data.
    pub fn classify(buf: &[u8]) -> Result<Self, FrameError> {
        if buf == END_MARKER {
            return Ok(Frame::End);
        }
        if let Some(name) = buf.strip_prefix(FILENAME_PREFIX) {
            if name.is_empty() {
                return Err(FrameError::EmptyFilename);
            }
            let name = std::str::from_utf8(name).map_err(|_| FrameError::BadEncoding)?;
            return Ok(Frame::Start(name.to_owned()));
        }
        if buf.starts_with(META_PREFIX) {
            return Err(FrameError::UnknownControl);
        }
        Ok(Frame::Data(buf.to_vec()))
    }

    /// Serialise this frame into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Start(name) => {
                let mut buf = Vec::with_capacity(FILENAME_PREFIX.len() + name.len());
                buf.extend_from_slice(FILENAME_PREFIX);
                buf.extend_from_slice(name.as_bytes());
                buf
            }
            Frame::End => END_MARKER.to_vec(),
            Frame::Data(payload) => payload.clone(),
        }
    }
}

/// `true` when `buf` is a well-formed acknowledgment datagram.
pub fn is_ack(buf: &[u8]) -> bool {
    buf == [ACK]
}

/// Errors that can arise when classifying a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// A start frame with a zero-length name.
    EmptyFilename,
    /// A start frame whose name is not valid UTF-8.
    BadEncoding,
    /// A `META:`-prefixed frame that is neither a start nor the end marker.
    UnknownControl,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::EmptyFilename => write!(f, "start frame carries an empty filename"),
            FrameError::BadEncoding => write!(f, "filename is not valid UTF-8"),
            FrameError::UnknownControl => write!(f, "unrecognised control frame"),
        }
    }
}

impl std::error::Error for FrameError {}

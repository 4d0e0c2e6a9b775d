use std::io;

use http::StatusCode;
use strand_http::protocol::{HeaderError, ParseError};
use thiserror::Error;

/// Errors surfaced by a websocket [`Connection`](crate::Connection).
///
/// Protocol violations have already been answered with a close frame carrying
/// `code` when the error reaches the caller.
#[derive(Error, Debug)]
pub enum WsError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("read timed out")]
    Timeout,

    #[error("connection is closed")]
    Closed,

    #[error("protocol violation ({code}): {reason}")]
    Protocol { code: u16, reason: &'static str },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("payload of {size} bytes exceeds the limit of {limit}")]
    MessageTooLarge { size: u64, limit: u64 },
}

impl WsError {
    pub(crate) fn unexpected_eof() -> Self {
        io::Error::from(io::ErrorKind::UnexpectedEof).into()
    }
}

/// Malformed frame headers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),

    #[error("most significant bit of the 64-bit payload length is set")]
    InvalidLength,

    #[error("transport error: {0}")]
    Transport(io::ErrorKind),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Transport(e.kind())
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("connection is already open")]
    AlreadyOpen,

    #[error("stream ended before the handshake completed")]
    Incomplete,

    #[error("malformed handshake message: {0}")]
    Malformed(#[from] ParseError),

    #[error("invalid handshake header: {0}")]
    Header(#[from] HeaderError),

    #[error("expected a {expected}")]
    UnexpectedMessage { expected: &'static str },

    #[error("request method must be GET")]
    Method,

    #[error("request version must be at least HTTP/1.1")]
    Version,

    #[error("missing or invalid {name} header")]
    InvalidHeader { name: &'static str },

    #[error("unexpected {name} header")]
    UnexpectedHeader { name: &'static str },

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("Sec-WebSocket-Accept does not match the key")]
    AcceptMismatch,

    #[error("invalid uri: {reason}")]
    InvalidUri { reason: String },
}

impl HandshakeError {
    pub(crate) fn invalid_uri<S: ToString>(reason: S) -> Self {
        Self::InvalidUri { reason: reason.to_string() }
    }
}

/// Status code and reason of a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED: u16 = 1003;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY: u16 = 1008;
    pub const TOO_BIG: u16 = 1009;
    pub const EXTENSION: u16 = 1010;
    pub const INTERNAL: u16 = 1011;
    pub const TLS_HANDSHAKE: u16 = 1015;

    /// The longest reason that fits a control frame next to the status code.
    pub const MAX_REASON_LENGTH: usize = 123;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// Codes that only report local conditions and never appear on the wire.
    pub const fn carries_body(code: u16) -> bool {
        !matches!(code, Self::NO_STATUS | Self::ABNORMAL | Self::TLS_HANDSHAKE)
    }

    /// Parses the payload of a received close frame.
    ///
    /// An empty payload means no status was sent. A one byte payload or a
    /// reason that is not UTF-8 is malformed.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => Some(Self::new(Self::NO_STATUS, "")),
            [_] => None,
            [high, low, reason @ ..] => {
                let reason = std::str::from_utf8(reason).ok()?;
                Some(Self::new(u16::from_be_bytes([*high, *low]), reason))
            }
        }
    }

    /// The close frame payload: the big-endian code followed by the reason,
    /// truncated on a character boundary to [`Self::MAX_REASON_LENGTH`].
    pub fn payload(&self) -> Vec<u8> {
        if !Self::carries_body(self.code) {
            return Vec::new();
        }

        let mut end = self.reason.len().min(Self::MAX_REASON_LENGTH);
        while !self.reason.is_char_boundary(end) {
            end -= 1;
        }

        let mut payload = Vec::with_capacity(2 + end);
        payload.extend_from_slice(&self.code.to_be_bytes());
        payload.extend_from_slice(&self.reason.as_bytes()[..end]);
        payload
    }
}

impl Default for CloseReason {
    fn default() -> Self {
        Self::new(Self::NORMAL, "")
    }
}

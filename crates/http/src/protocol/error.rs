use std::io;
use thiserror::Error;

/// The error kinds reported by the message builder.
///
/// Every kind is fatal for the message being parsed: the builder stops and must
/// be cleared before it accepts more bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("line length exceeded the configured limit")]
    LineLengthExceeded,

    #[error("malformed start line")]
    StartLineParserError,

    #[error("malformed header line")]
    HeaderLineParserError,

    #[error("header count exceeded the configured limit")]
    HeaderLimitExceeded,

    #[error("message carries more than one body size header")]
    DuplicateBodyHeaders,

    #[error("chunk size exceeded the configured limit")]
    ChunkLimitExceeded,

    #[error("malformed message body")]
    BodyParserError,

    #[error("transport error: {0}")]
    Transport(io::ErrorKind),
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::Transport(e.kind())
    }
}

impl From<HeaderError> for ParseError {
    fn from(_: HeaderError) -> Self {
        Self::HeaderLineParserError
    }
}

impl From<ChunkError> for ParseError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::SizeLimitExceeded { .. } => Self::ChunkLimitExceeded,
            _ => Self::BodyParserError,
        }
    }
}

/// Validation failures of a single header field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("missing ':' separator in header line")]
    MissingColon,

    #[error("invalid character in header name {name:?}")]
    InvalidName { name: String },

    #[error("invalid character {byte:#04x} in header value")]
    InvalidValue { byte: u8 },

    #[error("malformed obsolete line folding")]
    MalformedFold,
}

impl HeaderError {
    pub fn invalid_name<S: ToString>(name: S) -> Self {
        Self::InvalidName { name: name.to_string() }
    }
}

/// Grammar failures of a chunk header line or chunk extension.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk size")]
    InvalidSize,

    #[error("chunk size exceeded the limit {limit}")]
    SizeLimitExceeded { limit: u64 },

    #[error("invalid chunk extension name {name:?}")]
    InvalidExtensionName { name: String },

    #[error("invalid chunk extension value {value:?}")]
    InvalidExtensionValue { value: String },

    #[error("unterminated quoted string in chunk extension")]
    UnterminatedQuote,
}

impl ChunkError {
    pub fn invalid_name<S: ToString>(name: S) -> Self {
        Self::InvalidExtensionName { name: name.to_string() }
    }

    pub fn invalid_value<S: ToString>(value: S) -> Self {
        Self::InvalidExtensionValue { value: value.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_message<S: ToString>(str: S) -> Self {
        Self::InvalidMessage { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

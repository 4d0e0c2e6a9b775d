use std::fmt;

use bytes::{Buf, Bytes};
use http::{Method, StatusCode, Version};

use crate::protocol::chunk::ChunkExtension;
use crate::protocol::header::{FieldName, HeaderField, HeaderList};
use crate::protocol::HeaderError;

/// A parsed request line: `METHOD SP target SP HTTP-version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: Version,
}

/// A parsed status line: `HTTP-version SP status SP reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
}

/// What distinguishes a request from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTraits {
    Request(RequestLine),
    Response(StatusLine),
}

/// An HTTP message head: start line traits plus the ordered header fields.
///
/// The body is not part of the message; decoders deliver it separately as
/// [`PayloadFragment`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    traits: MessageTraits,
    headers: HeaderList,
}

impl Message {
    pub fn new(traits: MessageTraits) -> Self {
        Self { traits, headers: HeaderList::new() }
    }

    /// Creates an HTTP/1.1 request.
    pub fn request(method: Method, target: impl Into<String>) -> Self {
        Self::new(MessageTraits::Request(RequestLine { method, target: target.into(), version: Version::HTTP_11 }))
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::request(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::request(Method::POST, target)
    }

    /// Creates an HTTP/1.1 response with the canonical reason phrase of `status`.
    pub fn response(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or_default().to_owned();
        Self::new(MessageTraits::Response(StatusLine { version: Version::HTTP_11, status, reason }))
    }

    pub fn traits(&self) -> &MessageTraits {
        &self.traits
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderList {
        &mut self.headers
    }

    pub fn into_parts(self) -> (MessageTraits, HeaderList) {
        (self.traits, self.headers)
    }

    pub fn is_request(&self) -> bool {
        matches!(self.traits, MessageTraits::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.traits, MessageTraits::Response(_))
    }

    pub fn version(&self) -> Version {
        match &self.traits {
            MessageTraits::Request(line) => line.version,
            MessageTraits::Response(line) => line.version,
        }
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.traits {
            MessageTraits::Request(line) => Some(&line.method),
            MessageTraits::Response(_) => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.traits {
            MessageTraits::Request(line) => Some(&line.target),
            MessageTraits::Response(_) => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.traits {
            MessageTraits::Request(_) => None,
            MessageTraits::Response(line) => Some(line.status),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.traits {
            MessageTraits::Request(_) => None,
            MessageTraits::Response(line) => Some(&line.reason),
        }
    }

    /// Whether this message may carry a body at all.
    ///
    /// Responses with a 1xx, 204 or 304 status never do, see
    /// [RFC 9112 Section 6.3](https://www.rfc-editor.org/rfc/rfc9112#section-6.3).
    pub fn permit_body(&self) -> bool {
        match &self.traits {
            MessageTraits::Request(_) => true,
            MessageTraits::Response(line) => {
                !(line.status.is_informational()
                    || line.status == StatusCode::NO_CONTENT
                    || line.status == StatusCode::NOT_MODIFIED)
            }
        }
    }

    /// Appends a validated header field.
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.headers.push(HeaderField::new(name, value)?);
        Ok(())
    }

    /// Builder form of appending a field with a known name.
    pub fn with_header(mut self, name: FieldName, value: &str) -> Result<Self, HeaderError> {
        self.headers.push(HeaderField::known(name, value)?);
        Ok(self)
    }

    /// The body framing an encoder should use for this message.
    ///
    /// A `Transfer-Encoding` ending in `chunked` wins, then `Content-Length`.
    /// Anything else is sent as-is until the connection closes.
    pub fn body_framing(&self) -> BodyFraming {
        if !self.permit_body() {
            return BodyFraming::None;
        }

        if let Some(codings) = self.headers.get_known(FieldName::TransferEncoding) {
            return match last_coding(codings) {
                Some(coding) if coding.eq_ignore_ascii_case("chunked") => BodyFraming::Chunked,
                _ => BodyFraming::Continuous,
            };
        }

        match self.headers.get_known(FieldName::ContentLength).map(str::parse::<u64>) {
            Some(Ok(0)) => BodyFraming::None,
            Some(Ok(length)) => BodyFraming::ContentLength(length),
            Some(Err(_)) => BodyFraming::Continuous,
            None if self.is_request() => BodyFraming::None,
            None => BodyFraming::Continuous,
        }
    }
}

/// The last entry of a comma-separated coding list, trimmed.
pub(crate) fn last_coding(value: &str) -> Option<&str> {
    value.rsplit(',').next().map(str::trim).filter(|coding| !coding.is_empty())
}

pub(crate) fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 { "HTTP/1.0" } else { "HTTP/1.1" }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, version_str(self.version))
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", version_str(self.version), self.status.as_u16(), self.reason)
    }
}

impl fmt::Display for MessageTraits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTraits::Request(line) => line.fmt(f),
            MessageTraits::Response(line) => line.fmt(f),
        }
    }
}

/// How the body of a message is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body follows the header section.
    None,
    /// Exactly this many bytes follow.
    ContentLength(u64),
    /// Chunked transfer coding.
    Chunked,
    /// The body runs until the transport closes. Responses only.
    Continuous,
}

impl BodyFraming {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyFraming::Chunked)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, BodyFraming::None)
    }
}

/// A slice of message body delivered by the decoder.
///
/// `data` shares the receive buffer's allocation rather than copying it. The
/// terminal fragment of a chunked body has empty data and carries the
/// terminal chunk's extensions and the trailer fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFragment {
    pub data: Bytes,
    pub end_of_payload: bool,
    /// Set for bodies that are only delimited by the transport closing.
    pub continuous: bool,
    pub extensions: Vec<ChunkExtension>,
    pub trailers: HeaderList,
}

impl PayloadFragment {
    pub fn new(data: Bytes, end_of_payload: bool) -> Self {
        Self { data, end_of_payload, ..Default::default() }
    }

    pub fn continuous(data: Bytes, end_of_payload: bool) -> Self {
        Self { data, end_of_payload, continuous: true, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Represents an item in an outgoing payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A piece of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

/// One element of an outgoing message: the head, then payload items.
#[derive(Debug)]
pub enum Part<T, Data: Buf = Bytes> {
    Head(T),
    Payload(PayloadItem<Data>),
}

impl<T> From<Bytes> for Part<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

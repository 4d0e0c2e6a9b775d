use crate::protocol::header::FieldName;

/// Limits and trailer policy shared by the message decoder and the chunked codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageConfig {
    max_line_length: usize,
    max_header_limit: usize,
    chunk_size_limit: u64,
    forbidden_trailers: Vec<String>,
}

/// Fields that must not be sent in a trailer section, see
/// [RFC 7230 Section 4.1.2](https://www.rfc-editor.org/rfc/rfc7230#section-4.1.2).
const FORBIDDEN_TRAILERS: [FieldName; 15] = [
    FieldName::TransferEncoding,
    FieldName::ContentLength,
    FieldName::Host,
    FieldName::CacheControl,
    FieldName::Expect,
    FieldName::MaxForwards,
    FieldName::Pragma,
    FieldName::Range,
    FieldName::Te,
    FieldName::Authorization,
    FieldName::SetCookie,
    FieldName::ContentEncoding,
    FieldName::ContentType,
    FieldName::ContentRange,
    FieldName::Trailer,
];

impl MessageConfig {
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 8000;
    pub const DEFAULT_MAX_HEADER_LIMIT: usize = 50;
    pub const DEFAULT_CHUNK_SIZE_LIMIT: u64 = 1_000_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of bytes in a single line, excluding its CRLF.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Maximum number of header fields in a header or trailer section.
    pub fn max_header_limit(&self) -> usize {
        self.max_header_limit
    }

    /// Largest chunk size accepted by the chunked decoder.
    pub fn chunk_size_limit(&self) -> u64 {
        self.chunk_size_limit
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn with_max_header_limit(mut self, max_header_limit: usize) -> Self {
        self.max_header_limit = max_header_limit;
        self
    }

    pub fn with_chunk_size_limit(mut self, chunk_size_limit: u64) -> Self {
        self.chunk_size_limit = chunk_size_limit;
        self
    }

    /// Adds a field name to the forbidden trailer set.
    pub fn with_forbidden_trailer(mut self, name: &str) -> Self {
        if !self.is_forbidden_trailer(name) {
            self.forbidden_trailers.push(name.to_owned());
        }
        self
    }

    pub fn forbidden_trailers(&self) -> impl Iterator<Item = &str> {
        self.forbidden_trailers.iter().map(String::as_str)
    }

    /// Case-insensitive membership test against the forbidden trailer set.
    pub fn is_forbidden_trailer(&self, name: &str) -> bool {
        self.forbidden_trailers.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(name))
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_line_length: Self::DEFAULT_MAX_LINE_LENGTH,
            max_header_limit: Self::DEFAULT_MAX_HEADER_LIMIT,
            chunk_size_limit: Self::DEFAULT_CHUNK_SIZE_LIMIT,
            forbidden_trailers: FORBIDDEN_TRAILERS.iter().map(|name| name.as_str().to_owned()).collect(),
        }
    }
}

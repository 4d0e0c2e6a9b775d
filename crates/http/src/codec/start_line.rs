//! Start line classification.
//!
//! A line starting with `HTTP/` is a status line, anything else must be a
//! request line. Both are parsed with `httparse`, which only understands
//! HTTP/1.x; only versions 1.0 and 1.1 are accepted.

use http::{Method, StatusCode, Version};
use tracing::trace;

use crate::ensure;
use crate::protocol::{MessageTraits, ParseError, RequestLine, StatusLine};

const HTTP_PREFIX: &[u8] = b"HTTP/";

/// Parses a start line given without its CRLF.
pub(crate) fn parse_start_line(line: &[u8]) -> Result<MessageTraits, ParseError> {
    ensure!(!line.is_empty(), ParseError::StartLineParserError);

    // httparse needs the end of the header section to report completion
    let mut raw = Vec::with_capacity(line.len() + 4);
    raw.extend_from_slice(line);
    raw.extend_from_slice(b"\r\n\r\n");

    let traits = if line.starts_with(HTTP_PREFIX) { parse_status_line(&raw)? } else { parse_request_line(&raw)? };
    trace!(start_line = %traits, "parsed start line");
    Ok(traits)
}

fn parse_request_line(raw: &[u8]) -> Result<MessageTraits, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; 1];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(raw) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(ParseError::StartLineParserError),
    }

    let method = req
        .method
        .and_then(|method| Method::from_bytes(method.as_bytes()).ok())
        .ok_or(ParseError::StartLineParserError)?;
    let target = req.path.filter(|path| !path.is_empty()).ok_or(ParseError::StartLineParserError)?;
    let version = to_version(req.version)?;

    Ok(MessageTraits::Request(RequestLine { method, target: target.to_owned(), version }))
}

fn parse_status_line(raw: &[u8]) -> Result<MessageTraits, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; 1];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(raw) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(ParseError::StartLineParserError),
    }

    let status = res.code.and_then(|code| StatusCode::from_u16(code).ok()).ok_or(ParseError::StartLineParserError)?;
    let version = to_version(res.version)?;
    let reason = res.reason.unwrap_or_default().to_owned();

    Ok(MessageTraits::Response(StatusLine { version, status, reason }))
}

fn to_version(minor: Option<u8>) -> Result<Version, ParseError> {
    match minor {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        _ => Err(ParseError::StartLineParserError),
    }
}

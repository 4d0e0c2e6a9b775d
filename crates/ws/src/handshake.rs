//! The opening handshake.
//!
//! These helpers only build and check the HTTP messages; moving them over the
//! transport is left to [`Connection::handshake`](crate::Connection::handshake).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{Method, StatusCode, Version};
use sha1::{Digest, Sha1};
use strand_http::protocol::{FieldName, Message};

use crate::WS_GUID;
use crate::ensure;
use crate::error::HandshakeError;
use crate::mask::MaskSource;
use crate::uri::Uri;

pub const WS_VERSION: &str = "13";

/// Length of a base64 encoded 16 byte nonce.
const KEY_LENGTH: usize = 24;

/// A fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key(source: &mut impl MaskSource) -> String {
    let mut nonce = [0u8; 16];
    for word in nonce.chunks_exact_mut(4) {
        word.copy_from_slice(&source.next_key());
    }
    STANDARD.encode(nonce)
}

/// Derives `Sec-WebSocket-Accept` from a client key.
///
/// ```
/// assert_eq!(strand_ws::handshake::accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// The upgrade request a client sends.
pub fn client_request(uri: &Uri, key: &str) -> Result<Message, HandshakeError> {
    let request = Message::request(Method::GET, uri.resource.as_str())
        .with_header(FieldName::Host, &uri.host_header())?
        .with_header(FieldName::Upgrade, "websocket")?
        .with_header(FieldName::Connection, "upgrade")?
        .with_header(FieldName::SecWebSocketKey, key)?
        .with_header(FieldName::SecWebSocketVersion, WS_VERSION)?;
    Ok(request)
}

/// Checks an upgrade request and returns the accept key to answer with.
pub fn validate_request(request: &Message) -> Result<String, HandshakeError> {
    let method = request.method().ok_or(HandshakeError::UnexpectedMessage { expected: "request" })?;
    ensure!(*method == Method::GET, HandshakeError::Method);
    ensure!(request.version() >= Version::HTTP_11, HandshakeError::Version);

    ensure!(header_is(request, FieldName::SecWebSocketVersion, WS_VERSION), invalid(FieldName::SecWebSocketVersion));
    check_upgrade(request)?;

    let headers = request.headers();
    ensure!(headers.get_known(FieldName::Host).is_some_and(|host| !host.is_empty()), invalid(FieldName::Host));

    let key = headers.get_known(FieldName::SecWebSocketKey).unwrap_or_default();
    ensure!(key.len() == KEY_LENGTH, invalid(FieldName::SecWebSocketKey));

    Ok(accept_key(key))
}

fn invalid(name: FieldName) -> HandshakeError {
    HandshakeError::InvalidHeader { name: name.as_str() }
}

fn header_is(message: &Message, name: FieldName, expected: &str) -> bool {
    message.headers().get_known(name).is_some_and(|value| value.eq_ignore_ascii_case(expected))
}

// `Connection` is a token list, browsers send `keep-alive, Upgrade`
fn has_upgrade_token(message: &Message) -> bool {
    message
        .headers()
        .get_all(FieldName::Connection.as_str())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Both sides of the handshake carry `Upgrade: websocket` and `Connection: upgrade`.
fn check_upgrade(message: &Message) -> Result<(), HandshakeError> {
    ensure!(header_is(message, FieldName::Upgrade, "websocket"), invalid(FieldName::Upgrade));
    ensure!(has_upgrade_token(message), invalid(FieldName::Connection));
    Ok(())
}

/// The server's answer: `101 Switching Protocols` with the accept key, or
/// `400 Bad Request` when there is none.
pub fn server_response(accept: Option<&str>) -> Result<Message, HandshakeError> {
    let Some(accept) = accept else {
        return Ok(Message::response(StatusCode::BAD_REQUEST).with_header(FieldName::ContentLength, "0")?);
    };

    let response = Message::response(StatusCode::SWITCHING_PROTOCOLS)
        .with_header(FieldName::Upgrade, "websocket")?
        .with_header(FieldName::Connection, "Upgrade")?
        .with_header(FieldName::SecWebSocketAccept, accept)?;
    Ok(response)
}

/// Checks the server's answer against the accept key derived from our key.
///
/// No extension or subprotocol was offered, so a response selecting one is
/// refused.
pub fn validate_response(response: &Message, expected_accept: &str) -> Result<(), HandshakeError> {
    let status = response.status().ok_or(HandshakeError::UnexpectedMessage { expected: "response" })?;
    ensure!(status == StatusCode::SWITCHING_PROTOCOLS, HandshakeError::Status(status));
    check_upgrade(response)?;

    let headers = response.headers();
    for name in [FieldName::SecWebSocketExtensions, FieldName::SecWebSocketProtocol] {
        let selected = headers.get_known(name).is_some_and(|value| !value.is_empty());
        ensure!(!selected, HandshakeError::UnexpectedHeader { name: name.as_str() });
    }

    ensure!(headers.get_known(FieldName::SecWebSocketAccept) == Some(expected_accept), HandshakeError::AcceptMismatch);
    Ok(())
}

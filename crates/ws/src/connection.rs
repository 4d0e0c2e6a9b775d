//! A websocket endpoint over an async byte stream.
//!
//! The connection moves through `Closed -> Connecting -> Open -> Closed` and
//! cannot be reopened once a close frame was sent or received.
//!
//! Inbound data can be consumed as a byte stream with [`Connection::read`],
//! where frame boundaries are invisible, or message by message with
//! [`Connection::read_message`]. Control frames are answered while reading.
//!
//! Outbound data is buffered by [`Connection::write`]. A full buffer goes out
//! as a non-final frame, [`Connection::push`] does the same on demand and
//! [`Connection::send`] finishes the message.

use std::mem;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strand_http::codec::{HeaderEncoder, MessageDecoder, MessageEvent};
use strand_http::protocol::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::ensure;
use crate::error::{CloseReason, FrameError, HandshakeError, WsError};
use crate::frame::{FrameContext, FrameHeader, FrameHeaderDecoder, MAX_SHORT_LENGTH, OpCode};
use crate::handshake::{accept_key, client_request, generate_key, server_response, validate_request, validate_response};
use crate::mask::MaskSource;
use crate::uri::Uri;

/// Buffer used to relay control frame payloads.
const CONTROL_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Text,
    Binary,
}

impl Mode {
    fn opcode(self) -> OpCode {
        match self {
            Mode::Text => OpCode::Text,
            Mode::Binary => OpCode::Binary,
        }
    }

    fn from_opcode(opcode: OpCode) -> Option<Self> {
        match opcode {
            OpCode::Text => Some(Mode::Text),
            OpCode::Binary => Some(Mode::Binary),
            _ => None,
        }
    }
}

/// A reassembled data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub mode: Mode,
    pub data: Bytes,
}

impl DataMessage {
    pub fn text(text: &str) -> Self {
        Self { mode: Mode::Text, data: Bytes::copy_from_slice(text.as_bytes()) }
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self { mode: Mode::Binary, data: data.into() }
    }

    /// The payload of a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self.mode {
            Mode::Text => std::str::from_utf8(&self.data).ok(),
            Mode::Binary => None,
        }
    }
}

#[derive(Debug)]
pub struct Connection<S, R = fastrand::Rng> {
    stream: S,
    uri: Uri,
    role: Role,
    config: Config,
    state: ConnectionState,
    mask_source: R,

    read_buffer: BytesMut,
    incoming: Option<FrameContext>,
    in_mode: Mode,
    in_continued: bool,

    out_buffer: BytesMut,
    out_mode: Mode,
    out_continued: bool,
    frame_buffer: BytesMut,

    peer_close: Option<CloseReason>,
}

impl<S> Connection<S> {
    pub fn new(stream: S, uri: Uri, role: Role) -> Self {
        Self::with_config(stream, uri, role, Config::default())
    }

    pub fn with_config(stream: S, uri: Uri, role: Role, config: Config) -> Self {
        Self::with_mask_source(stream, uri, role, config, fastrand::Rng::new())
    }
}

impl<S, R: MaskSource> Connection<S, R> {
    /// Creates a connection drawing masking keys and the handshake nonce from
    /// `mask_source`.
    pub fn with_mask_source(stream: S, uri: Uri, role: Role, config: Config, mask_source: R) -> Self {
        Self {
            stream,
            uri,
            role,
            config,
            state: ConnectionState::Closed,
            mask_source,
            read_buffer: BytesMut::with_capacity(config.buffer_size()),
            incoming: None,
            in_mode: Mode::Text,
            in_continued: false,
            out_buffer: BytesMut::with_capacity(config.buffer_size()),
            out_mode: Mode::Text,
            out_continued: false,
            frame_buffer: BytesMut::new(),
            peer_close: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mode of the message currently being read.
    pub fn in_mode(&self) -> Mode {
        self.in_mode
    }

    pub fn out_mode(&self) -> Mode {
        self.out_mode
    }

    /// Sets the mode of outgoing messages. Refused while a message is half
    /// sent.
    pub fn set_out_mode(&mut self, mode: Mode) -> bool {
        if self.out_continued {
            return false;
        }
        self.out_mode = mode;
        true
    }

    /// The status the peer closed the connection with, if it did.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.peer_close.as_ref()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    fn check_header(&self, header: &FrameHeader) -> Result<(), &'static str> {
        match self.role {
            Role::Server => ensure!(header.masked, "received unmasked frame"),
            Role::Client => ensure!(!header.masked, "received masked frame"),
        }
        ensure!(header.reserved == 0, "reserved bits are set");

        if header.opcode.is_control() {
            ensure!(header.fin, "fragmented control frame");
            ensure!(header.payload_length <= MAX_SHORT_LENGTH, "control frame too large");
        } else if header.opcode == OpCode::Continuation {
            ensure!(self.in_continued, "unexpected continuation frame");
        } else {
            ensure!(!self.in_continued, "expected a continuation frame");
        }
        Ok(())
    }

    fn frame_header(&mut self, opcode: OpCode, fin: bool, payload_length: u64) -> FrameHeader {
        let header = FrameHeader::new(opcode, fin, payload_length);
        match self.role {
            Role::Client => header.with_mask(self.mask_source.next_key()),
            Role::Server => header,
        }
    }
}

impl<S, R> Connection<S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: MaskSource,
{
    /// Performs the opening handshake.
    ///
    /// A client sends the upgrade request and checks the accept key of the
    /// answer. A server reads the request and answers with `101` or, when the
    /// request is not a valid upgrade, with `400`. On failure the connection
    /// stays closed.
    pub async fn handshake(&mut self) -> Result<(), WsError> {
        ensure!(!self.is_open(), HandshakeError::AlreadyOpen.into());
        self.state = ConnectionState::Connecting;

        let result = match self.role {
            Role::Client => self.client_handshake().await,
            Role::Server => self.server_handshake().await,
        };

        match &result {
            Ok(()) => {
                self.state = ConnectionState::Open;
                debug!(role = ?self.role, uri = %self.uri, "websocket handshake completed");
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                warn!(cause = %e, role = ?self.role, uri = %self.uri, "websocket handshake failed");
            }
        }
        result
    }

    async fn client_handshake(&mut self) -> Result<(), WsError> {
        let key = generate_key(&mut self.mask_source);
        let request = client_request(&self.uri, &key)?;
        self.write_head(&request).await?;

        let response = self.read_head().await?;
        validate_response(&response, &accept_key(&key))?;
        Ok(())
    }

    async fn server_handshake(&mut self) -> Result<(), WsError> {
        let accept = match self.read_head().await {
            Ok(request) => validate_request(&request),
            Err(WsError::Handshake(e @ HandshakeError::Malformed(_))) => Err(e),
            Err(e) => return Err(e),
        };

        let response = server_response(accept.as_deref().ok())?;
        self.write_head(&response).await?;
        accept?;
        Ok(())
    }

    async fn write_head(&mut self, message: &Message) -> Result<(), WsError> {
        self.frame_buffer.clear();
        HeaderEncoder.encode(message, &mut self.frame_buffer).map_err(std::io::Error::other)?;
        self.stream.write_all(&self.frame_buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }

    // bytes following the head stay buffered, they belong to the first frames
    async fn read_head(&mut self) -> Result<Message, WsError> {
        let mut decoder = MessageDecoder::new();
        loop {
            match decoder.decode(&mut self.read_buffer).map_err(HandshakeError::Malformed)? {
                Some(MessageEvent::Message(message)) => return Ok(message),
                Some(MessageEvent::Data(_)) => {}
                None => {
                    ensure!(self.fill().await? > 0, HandshakeError::Incomplete.into());
                }
            }
        }
    }

    async fn fill(&mut self) -> Result<usize, WsError> {
        self.read_buffer.reserve(self.config.buffer_size());
        let read = self.stream.read_buf(&mut self.read_buffer);

        let read = match self.config.read_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, read).await.map_err(|_elapsed| WsError::Timeout)?,
            None => read.await,
        };
        Ok(read?)
    }

    // a frame read that cannot make progress ends the connection
    async fn fill_frame(&mut self) -> Result<(), WsError> {
        match self.fill().await {
            Ok(0) => {
                debug!("stream ended without a close frame");
                self.state = ConnectionState::Closed;
                self.peer_close = Some(CloseReason::new(CloseReason::ABNORMAL, ""));
                Err(WsError::unexpected_eof())
            }
            Ok(_) => Ok(()),
            Err(WsError::Timeout) => {
                warn!(timeout = ?self.config.read_timeout(), "websocket read timed out");
                self.close_quietly(CloseReason::new(CloseReason::GOING_AWAY, "read timed out")).await;
                Err(WsError::Timeout)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Answers a violation with a close frame and returns the error to report.
    async fn fail(&mut self, code: u16, reason: &'static str) -> WsError {
        warn!(code, reason, "websocket protocol violation");
        self.close_quietly(CloseReason::new(code, reason)).await;
        WsError::Protocol { code, reason }
    }

    async fn close_quietly(&mut self, reason: CloseReason) {
        if let Err(e) = self.close(Some(reason)).await {
            debug!(cause = %e, "failed to send close frame");
        }
    }

    async fn read_header(&mut self) -> Result<FrameHeader, WsError> {
        loop {
            match FrameHeaderDecoder.decode(&mut self.read_buffer) {
                Ok(Some(header)) => return Ok(header),
                Ok(None) => self.fill_frame().await?,
                Err(FrameError::UnknownOpcode(_)) => {
                    return Err(self.fail(CloseReason::PROTOCOL_ERROR, "unknown opcode").await);
                }
                Err(_) => return Err(self.fail(CloseReason::PROTOCOL_ERROR, "invalid payload length").await),
            }
        }
    }

    /// Reads and unmasks up to `buf.len()` payload bytes of `context`.
    async fn read_into(&mut self, context: &mut FrameContext, buf: &mut [u8]) -> Result<usize, WsError> {
        let wanted = context.next_len(buf.len());
        if wanted == 0 {
            return Ok(0);
        }
        if self.read_buffer.is_empty() {
            self.fill_frame().await?;
        }

        let n = wanted.min(self.read_buffer.len());
        buf[..n].copy_from_slice(&self.read_buffer[..n]);
        self.read_buffer.advance(n);
        context.consume(&mut buf[..n]);
        Ok(n)
    }

    async fn read_control(&mut self, mut context: FrameContext) -> Result<Vec<u8>, WsError> {
        let mut payload = vec![0; context.next_len(CONTROL_BUFFER_SIZE)];
        let mut filled = 0;
        while !context.is_finished() {
            filled += self.read_into(&mut context, &mut payload[filled..]).await?;
        }
        Ok(payload)
    }

    /// Relays the ping payload into a pong, piece by piece.
    async fn pong(&mut self, mut ping: FrameContext) -> Result<(), WsError> {
        let header = self.frame_header(OpCode::Pong, true, ping.remaining());
        let mut pong = header.context();

        self.frame_buffer.clear();
        header.encode(&mut self.frame_buffer);
        self.stream.write_all(&self.frame_buffer).await?;

        let mut piece = [0u8; CONTROL_BUFFER_SIZE];
        while !ping.is_finished() {
            let n = self.read_into(&mut ping, &mut piece).await?;
            pong.consume(&mut piece[..n]);
            self.stream.write_all(&piece[..n]).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Handles control frames until a data frame arrives. Returns `None` once
    /// the connection is closed.
    async fn next_data_frame(&mut self) -> Result<Option<FrameContext>, WsError> {
        while self.is_open() {
            let header = self.read_header().await?;
            if let Err(reason) = self.check_header(&header) {
                return Err(self.fail(CloseReason::PROTOCOL_ERROR, reason).await);
            }

            match header.opcode {
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(mode) = Mode::from_opcode(header.opcode) {
                        self.in_mode = mode;
                    }
                    self.in_continued = !header.fin;

                    let context = header.context();
                    self.incoming = Some(context);
                    return Ok(Some(context));
                }
                OpCode::Ping => {
                    debug!(length = header.payload_length, "answering ping");
                    self.pong(header.context()).await?;
                }
                OpCode::Pong => {
                    trace!(length = header.payload_length, "discarding pong");
                    self.read_control(header.context()).await?;
                }
                OpCode::Close => {
                    let payload = self.read_control(header.context()).await?;
                    let Some(reason) = CloseReason::parse(&payload) else {
                        return Err(self.fail(CloseReason::PROTOCOL_ERROR, "malformed close frame").await);
                    };

                    debug!(code = reason.code, reason = %reason.reason, "received close frame");
                    let code = if reason.code == CloseReason::NO_STATUS { CloseReason::NORMAL } else { reason.code };
                    self.peer_close = Some(reason);
                    self.close(Some(CloseReason::new(code, ""))).await?;
                }
            }
        }
        Ok(None)
    }

    /// Waits until payload bytes can be read.
    ///
    /// Control frames and empty data frames met on the way are handled.
    /// Returns `false` once the connection is closed.
    pub async fn wait(&mut self) -> Result<bool, WsError> {
        loop {
            if !self.is_open() {
                return Ok(false);
            }
            if self.incoming.is_some_and(|context| !context.is_finished()) {
                return Ok(true);
            }
            if self.next_data_frame().await?.is_none() {
                return Ok(false);
            }
        }
    }

    /// Reads payload bytes of the incoming data frames, at most
    /// `buffer_size` at a time. Returns `0` once the connection is closed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, WsError> {
        if buf.is_empty() || !self.wait().await? {
            return Ok(0);
        }

        let limit = buf.len().min(self.config.buffer_size());
        let Some(mut context) = self.incoming.take() else {
            return Ok(0);
        };
        let result = self.read_into(&mut context, &mut buf[..limit]).await;
        self.incoming = Some(context);
        result
    }

    /// Reads the next complete data message, joining its fragments.
    ///
    /// A message longer than `max_message_size` closes the connection with
    /// 1009, and a text message that is not UTF-8 closes it with 1007.
    /// Returns `None` once the connection is closed.
    pub async fn read_message(&mut self) -> Result<Option<DataMessage>, WsError> {
        let mut message = BytesMut::new();
        loop {
            let mut context = match self.incoming {
                Some(context) if !context.is_finished() => context,
                _ => match self.next_data_frame().await? {
                    Some(context) => context,
                    None => return Ok(None),
                },
            };

            let size = message.len() as u64 + context.remaining();
            let length = usize::try_from(context.remaining()).ok().filter(|_| size <= self.config.max_message_size());
            let Some(length) = length else {
                let limit = self.config.max_message_size();
                warn!(size, limit, "websocket message too big");
                self.close_quietly(CloseReason::new(CloseReason::TOO_BIG, "message too big")).await;
                return Err(WsError::MessageTooLarge { size, limit });
            };

            let mut filled = message.len();
            message.resize(filled + length, 0);
            while !context.is_finished() {
                filled += self.read_into(&mut context, &mut message[filled..]).await?;
            }
            self.incoming = Some(context);

            if context.header().fin {
                break;
            }
        }

        let data = message.freeze();
        if self.in_mode == Mode::Text && std::str::from_utf8(&data).is_err() {
            return Err(self.fail(CloseReason::INVALID_PAYLOAD, "text message is not utf-8").await);
        }
        Ok(Some(DataMessage { mode: self.in_mode, data }))
    }

    /// Buffers outgoing payload, pushing a non-final frame whenever the buffer
    /// is full.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), WsError> {
        ensure!(self.is_open(), WsError::Closed);
        let capacity = self.config.buffer_size();

        while !data.is_empty() {
            let room = capacity.saturating_sub(self.out_buffer.len());
            if room == 0 {
                self.push().await?;
                continue;
            }

            let n = room.min(data.len());
            self.out_buffer.put_slice(&data[..n]);
            data = &data[n..];
        }
        Ok(())
    }

    /// Writes the buffered payload as a non-final frame.
    pub async fn push(&mut self) -> Result<(), WsError> {
        ensure!(self.is_open(), WsError::Closed);
        let opcode = if self.out_continued {
            OpCode::Continuation
        } else {
            self.out_continued = true;
            self.out_mode.opcode()
        };
        self.flush_frame(opcode, false).await
    }

    /// Writes the buffered payload as the final frame of the message.
    pub async fn send(&mut self) -> Result<(), WsError> {
        ensure!(self.is_open(), WsError::Closed);
        let opcode = if self.out_continued {
            self.out_continued = false;
            OpCode::Continuation
        } else {
            self.out_mode.opcode()
        };
        self.flush_frame(opcode, true).await
    }

    /// Sends a whole message at once.
    pub async fn send_message(&mut self, message: &DataMessage) -> Result<(), WsError> {
        if !self.set_out_mode(message.mode) {
            self.send().await?;
            self.out_mode = message.mode;
        }
        self.write(&message.data).await?;
        self.send().await
    }

    async fn flush_frame(&mut self, opcode: OpCode, fin: bool) -> Result<(), WsError> {
        let payload = match self.out_mode {
            Mode::Text => take_text(&mut self.out_buffer, fin),
            Mode::Binary => mem::take(&mut self.out_buffer),
        };
        let result = self.write_frame(opcode, fin, &payload).await;

        if self.out_mode == Mode::Binary {
            // keep the allocation
            self.out_buffer = payload;
            self.out_buffer.clear();
        }
        result
    }

    async fn write_frame(&mut self, opcode: OpCode, fin: bool, payload: &[u8]) -> Result<(), WsError> {
        let header = self.frame_header(opcode, fin, payload.len() as u64);

        self.frame_buffer.clear();
        header.encode(&mut self.frame_buffer);
        let start = self.frame_buffer.len();
        self.frame_buffer.put_slice(payload);
        header.context().consume(&mut self.frame_buffer[start..]);

        self.stream.write_all(&self.frame_buffer).await?;
        self.stream.flush().await?;
        trace!(?opcode, fin, length = payload.len(), "sent frame");
        Ok(())
    }

    /// Sends a ping. Its payload is limited to 125 bytes.
    pub async fn ping(&mut self, data: &[u8]) -> Result<(), WsError> {
        ensure!(self.is_open(), WsError::Closed);
        let size = data.len() as u64;
        ensure!(size <= MAX_SHORT_LENGTH, WsError::MessageTooLarge { size, limit: MAX_SHORT_LENGTH });
        self.write_frame(OpCode::Ping, true, data).await
    }

    /// Sends a close frame, `1000` without a reason when `reason` is `None`,
    /// and closes the connection. Does nothing on a closed connection.
    ///
    /// Codes 1005, 1006 and 1015 are sent without a body.
    pub async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), WsError> {
        if !self.is_open() {
            self.state = ConnectionState::Closed;
            return Ok(());
        }

        let reason = reason.unwrap_or_default();
        debug!(code = reason.code, reason = %reason.reason, "closing websocket");
        self.state = ConnectionState::Closed;
        self.write_frame(OpCode::Close, true, &reason.payload()).await
    }
}

/// Splits the text ready to be sent off `buffer`, as UTF-8.
///
/// Bytes that are not UTF-8 are taken as Latin-1. An incomplete sequence at
/// the end stays in `buffer` for the next frame unless `last` is set.
fn take_text(buffer: &mut BytesMut, last: bool) -> BytesMut {
    let mut text = BytesMut::with_capacity(buffer.len());
    let mut rest = &buffer[..];

    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.put_slice(valid.as_bytes());
                rest = &[];
            }
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                text.put_slice(valid);

                let bad = match e.error_len() {
                    Some(len) => len,
                    None if last => invalid.len(),
                    None => {
                        rest = invalid;
                        break;
                    }
                };
                for &byte in &invalid[..bad] {
                    let mut encoded = [0u8; 2];
                    text.put_slice(char::from(byte).encode_utf8(&mut encoded).as_bytes());
                }
                rest = &invalid[bad..];
            }
        }
    }

    let carry = rest.len();
    buffer.advance(buffer.len() - carry);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameHeaderEncoder;
    use crate::mask::apply_mask;
    use indoc::indoc;
    use std::time::Duration;
    use tokio::io::{DuplexStream, duplex};

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    const UPGRADE: &str = indoc! {"
        GET /chat HTTP/1.1\r
        Host: server.example.com\r
        Upgrade: websocket\r
        Connection: Upgrade\r
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r
        Sec-WebSocket-Version: 13\r
        \r
    "};

    fn uri() -> Uri {
        Uri::new("server.example.com", 80, "/chat", false)
    }

    fn frame(first: u8, payload: &[u8], key: Option<[u8; 4]>) -> Vec<u8> {
        let opcode = OpCode::from_u8(first & 0x0F).unwrap();
        let mut header = FrameHeader::new(opcode, first & 0x80 != 0, payload.len() as u64);
        header.reserved = (first >> 4) & 0x7;
        if let Some(key) = key {
            header = header.with_mask(key);
        }

        let mut wire = BytesMut::new();
        FrameHeaderEncoder.encode(header, &mut wire).unwrap();
        let start = wire.len();
        wire.put_slice(payload);
        if let Some(key) = key {
            apply_mask(&mut wire[start..], key, 0);
        }
        wire.to_vec()
    }

    fn close_frame(code: u16, reason: &str) -> Vec<u8> {
        frame(0x88, &CloseReason::new(code, reason).payload(), None)
    }

    async fn read_head(raw: &mut DuplexStream) -> Message {
        let mut head = BytesMut::new();
        while !head.ends_with(b"\r\n\r\n") {
            head.put_u8(raw.read_u8().await.unwrap());
        }
        MessageDecoder::new().decode(&mut head).unwrap().and_then(MessageEvent::into_message).unwrap()
    }

    async fn read_to_end(raw: &mut DuplexStream) -> Vec<u8> {
        let mut rest = Vec::new();
        raw.read_to_end(&mut rest).await.unwrap();
        rest
    }

    /// A server that completed the handshake with a hand-driven client.
    async fn open_server(config: Config) -> (Connection<DuplexStream>, DuplexStream) {
        let (mut raw, stream) = duplex(64 * 1024);
        let mut server = Connection::with_config(stream, uri(), Role::Server, config);

        raw.write_all(UPGRADE.as_bytes()).await.unwrap();
        server.handshake().await.unwrap();
        let response = read_head(&mut raw).await;
        assert_eq!(response.headers().get("sec-websocket-accept"), Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        (server, raw)
    }

    async fn open_pair(
        client_config: Config,
        server_config: Config,
    ) -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let (client_stream, server_stream) = duplex(64 * 1024);
        let mut client = Connection::with_config(client_stream, uri(), Role::Client, client_config);
        let mut server = Connection::with_config(server_stream, uri(), Role::Server, server_config);

        let (client_result, server_result) = tokio::join!(client.handshake(), server.handshake());
        client_result.unwrap();
        server_result.unwrap();
        (client, server)
    }

    /// A client that completed the handshake with a hand-driven server. Every
    /// mask key it draws is `KEY`.
    async fn open_client() -> (Connection<DuplexStream, fn() -> [u8; 4]>, DuplexStream) {
        let (client_stream, mut raw) = duplex(64 * 1024);
        let mask_source: fn() -> [u8; 4] = || KEY;
        let mut client = Connection::with_mask_source(client_stream, uri(), Role::Client, Config::new(), mask_source);

        let peer = async {
            let request = read_head(&mut raw).await;
            let accept = validate_request(&request).unwrap();
            let mut wire = BytesMut::new();
            HeaderEncoder.encode(&server_response(Some(&accept)).unwrap(), &mut wire).unwrap();
            raw.write_all(&wire).await.unwrap();
        };
        let (result, ()) = tokio::join!(client.handshake(), peer);
        result.unwrap();

        (client, raw)
    }

    /// Reads one frame sent by a client, which must be masked, and returns
    /// its unmasked payload.
    async fn read_client_frame(raw: &mut DuplexStream) -> (FrameHeader, Vec<u8>) {
        let mut wire = BytesMut::new();
        let header = loop {
            if let Some(header) = FrameHeaderDecoder.decode(&mut wire).unwrap() {
                break header;
            }
            wire.put_u8(raw.read_u8().await.unwrap());
        };
        assert!(header.masked, "{header:?}");

        let mut payload = vec![0u8; usize::try_from(header.payload_length).unwrap()];
        raw.read_exact(&mut payload).await.unwrap();
        header.context().consume(&mut payload);
        (header, payload)
    }

    #[tokio::test]
    async fn handshake_opens_both_ends() {
        let (mut client, mut server) = open_pair(Config::new(), Config::new()).await;
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(server.state(), ConnectionState::Open);

        client.write(b"Hello").await.unwrap();
        client.send().await.unwrap();
        assert_eq!(server.read_message().await.unwrap(), Some(DataMessage::text("Hello")));

        server.send_message(&DataMessage::binary(&b"\x00\x01\x02"[..])).await.unwrap();
        assert_eq!(client.read_message().await.unwrap(), Some(DataMessage::binary(&b"\x00\x01\x02"[..])));

        assert!(matches!(client.handshake().await, Err(WsError::Handshake(HandshakeError::AlreadyOpen))));
    }

    #[tokio::test]
    async fn server_answers_bad_request() {
        let (mut raw, stream) = duplex(64 * 1024);
        let mut server = Connection::new(stream, uri(), Role::Server);

        raw.write_all(UPGRADE.replace("Version: 13", "Version: 8").as_bytes()).await.unwrap();
        assert!(matches!(server.handshake().await, Err(WsError::Handshake(HandshakeError::InvalidHeader { .. }))));
        assert_eq!(server.state(), ConnectionState::Closed);

        let response = read_head(&mut raw).await;
        assert_eq!(response.status(), Some(http::StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn server_answers_malformed_request() {
        let (mut raw, stream) = duplex(64 * 1024);
        let mut server = Connection::new(stream, uri(), Role::Server);

        raw.write_all(b"GET /chat HTTP/1.1\r\nno colon here\r\n\r\n").await.unwrap();
        assert!(matches!(server.handshake().await, Err(WsError::Handshake(HandshakeError::Malformed(_)))));

        let response = read_head(&mut raw).await;
        assert_eq!(response.status(), Some(http::StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn client_checks_the_accept_key() {
        let (client_stream, mut raw) = duplex(64 * 1024);
        let mut client = Connection::new(client_stream, uri(), Role::Client);

        let peer = async {
            let request = read_head(&mut raw).await;
            assert!(validate_request(&request).is_ok());
            let wrong = server_response(Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")).unwrap();
            let mut wire = BytesMut::new();
            HeaderEncoder.encode(&wrong, &mut wire).unwrap();
            raw.write_all(&wire).await.unwrap();
        };

        let (result, ()) = tokio::join!(client.handshake(), peer);
        assert!(matches!(result, Err(WsError::Handshake(HandshakeError::AcceptMismatch))));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn client_frames_are_masked_with_the_mask_source() {
        let (mut client, mut raw) = open_client().await;

        client.write(b"Hello").await.unwrap();
        client.send().await.unwrap();

        let mut wire = [0u8; 11];
        raw.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[tokio::test]
    async fn client_rejects_masked_frames() {
        let (mut client, mut raw) = open_client().await;

        raw.write_all(&frame(0x81, b"Hello", Some(KEY))).await.unwrap();
        let error = client.read(&mut [0u8; 16]).await.unwrap_err();
        assert!(matches!(error, WsError::Protocol { code: CloseReason::PROTOCOL_ERROR, .. }));
        assert_eq!(client.state(), ConnectionState::Closed);

        let (close, payload) = read_client_frame(&mut raw).await;
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(CloseReason::parse(&payload), Some(CloseReason::new(1002, "received masked frame")));
    }

    #[tokio::test]
    async fn client_control_frames_are_masked() {
        let (mut client, mut raw) = open_client().await;

        raw.write_all(&frame(0x89, b"are you there?", None)).await.unwrap();
        raw.write_all(&frame(0x82, b"x", None)).await.unwrap();
        assert_eq!(client.read_message().await.unwrap(), Some(DataMessage::binary(&b"x"[..])));

        let (pong, payload) = read_client_frame(&mut raw).await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.mask_key, KEY);
        assert_eq!(payload, b"are you there?");

        client.close(Some(CloseReason::new(CloseReason::NORMAL, "done"))).await.unwrap();
        let (close, payload) = read_client_frame(&mut raw).await;
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(payload[..2], 1000u16.to_be_bytes());
        assert_eq!(CloseReason::parse(&payload), Some(CloseReason::new(CloseReason::NORMAL, "done")));
    }

    #[tokio::test]
    async fn server_rejects_unmasked_frames() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&frame(0x81, b"Hello", None)).await.unwrap();
        let error = server.read_message().await.unwrap_err();
        assert!(matches!(error, WsError::Protocol { code: CloseReason::PROTOCOL_ERROR, .. }));
        assert_eq!(server.state(), ConnectionState::Closed);

        drop(server);
        assert_eq!(read_to_end(&mut raw).await, close_frame(1002, "received unmasked frame"));
    }

    #[tokio::test]
    async fn unknown_opcode_closes_with_protocol_error() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&[0x83, 0x80, 1, 2, 3, 4]).await.unwrap();
        assert!(matches!(server.wait().await, Err(WsError::Protocol { code: 1002, .. })));

        drop(server);
        assert_eq!(read_to_end(&mut raw).await, close_frame(1002, "unknown opcode"));
    }

    #[tokio::test]
    async fn oversized_or_fragmented_control_frames_are_rejected() {
        for (wire, reason) in [
            (frame(0x89, &[0; 126], Some(KEY)), "control frame too large"),
            (frame(0x09, b"ping", Some(KEY)), "fragmented control frame"),
            (frame(0x80, b"data", Some(KEY)), "unexpected continuation frame"),
            (frame(0xC1, b"data", Some(KEY)), "reserved bits are set"),
        ] {
            let (mut server, mut raw) = open_server(Config::new()).await;
            raw.write_all(&wire).await.unwrap();
            assert!(matches!(server.read_message().await, Err(WsError::Protocol { code: 1002, .. })), "{reason}");

            drop(server);
            assert_eq!(read_to_end(&mut raw).await, close_frame(1002, reason));
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_identical_pong() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&frame(0x89, b"are you there?", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x8A, b"unsolicited", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x82, b"x", Some(KEY))).await.unwrap();

        assert_eq!(server.read_message().await.unwrap(), Some(DataMessage::binary(&b"x"[..])));

        let pong = frame(0x8A, b"are you there?", None);
        let mut wire = vec![0u8; pong.len()];
        raw.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, pong);
    }

    #[tokio::test]
    async fn fragments_are_reassembled_around_control_frames() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&frame(0x01, b"Hel", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x00, b"", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x89, b"", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x80, b"lo", Some(KEY))).await.unwrap();

        assert_eq!(server.read_message().await.unwrap(), Some(DataMessage::text("Hello")));
        assert_eq!(server.in_mode(), Mode::Text);
    }

    #[tokio::test]
    async fn read_streams_payload_across_frames() {
        let config = Config::new().with_buffer_size(4);
        let (mut server, mut raw) = open_server(config).await;

        raw.write_all(&frame(0x02, b"abcdef", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x00, b"", Some(KEY))).await.unwrap();
        raw.write_all(&frame(0x80, b"gh", Some(KEY))).await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while received.len() < 8 {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n <= 4);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"abcdefgh");
        assert_eq!(server.in_mode(), Mode::Binary);
    }

    #[tokio::test]
    async fn pushed_fragments_arrive_as_one_message() {
        let (mut client, mut server) = open_pair(Config::new(), Config::new()).await;

        assert!(client.set_out_mode(Mode::Binary));
        client.write(b"Hello ").await.unwrap();
        client.push().await.unwrap();
        assert!(!client.set_out_mode(Mode::Text));
        client.write(b"World").await.unwrap();
        client.send().await.unwrap();

        assert_eq!(server.read_message().await.unwrap(), Some(DataMessage::binary(&b"Hello World"[..])));
    }

    #[tokio::test]
    async fn full_buffer_is_pushed() {
        let (mut server, mut raw) = open_server(Config::new().with_buffer_size(4)).await;
        assert!(server.set_out_mode(Mode::Binary));

        server.write(b"abcdef").await.unwrap();
        server.send().await.unwrap();

        let mut expected = frame(0x02, b"abcd", None);
        expected.extend(frame(0x80, b"ef", None));
        let mut wire = vec![0u8; expected.len()];
        raw.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn text_output_is_utf8() {
        let (mut server, mut raw) = open_server(Config::new().with_buffer_size(4)).await;

        // the sequence split by the full buffer waits for the next frame
        server.write("aéé".as_bytes()).await.unwrap();
        server.send().await.unwrap();
        // bytes that are not utf-8 are taken as latin-1
        server.write(b"caf\xe9").await.unwrap();
        server.send().await.unwrap();

        let mut expected = frame(0x01, "aé".as_bytes(), None);
        expected.extend(frame(0x80, "é".as_bytes(), None));
        expected.extend(frame(0x81, "café".as_bytes(), None));
        let mut wire = vec![0u8; expected.len()];
        raw.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn invalid_utf8_text_closes_with_1007() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&frame(0x81, b"\xff", Some(KEY))).await.unwrap();
        let result = server.read_message().await;
        assert!(matches!(result, Err(WsError::Protocol { code: CloseReason::INVALID_PAYLOAD, .. })));

        drop(server);
        assert_eq!(read_to_end(&mut raw).await, close_frame(1007, "text message is not utf-8"));
    }

    #[tokio::test]
    async fn message_too_big_closes_with_1009() {
        let (mut client, mut server) = open_pair(Config::new(), Config::new().with_max_message_size(8)).await;

        client.write(b"0123456789").await.unwrap();
        client.send().await.unwrap();
        assert!(matches!(server.read_message().await, Err(WsError::MessageTooLarge { size: 10, limit: 8 })));
        assert_eq!(server.state(), ConnectionState::Closed);

        assert_eq!(client.read_message().await.unwrap(), None);
        assert_eq!(client.close_reason(), Some(&CloseReason::new(CloseReason::TOO_BIG, "message too big")));
    }

    #[tokio::test]
    async fn close_handshake() {
        let (mut client, mut server) = open_pair(Config::new(), Config::new()).await;

        client.close(Some(CloseReason::new(CloseReason::GOING_AWAY, "bye"))).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(client.write(b"late").await, Err(WsError::Closed)));
        client.close(None).await.unwrap();

        assert_eq!(server.read_message().await.unwrap(), None);
        assert_eq!(server.state(), ConnectionState::Closed);
        assert_eq!(server.close_reason(), Some(&CloseReason::new(CloseReason::GOING_AWAY, "bye")));
        assert_eq!(server.read(&mut [0u8; 8]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_reply_echoes_the_code() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        raw.write_all(&frame(0x88, &[], Some(KEY))).await.unwrap();
        assert_eq!(server.read_message().await.unwrap(), None);
        assert_eq!(server.close_reason().map(|reason| reason.code), Some(CloseReason::NO_STATUS));

        drop(server);
        assert_eq!(read_to_end(&mut raw).await, close_frame(1000, ""));
    }

    #[tokio::test]
    async fn local_close_codes_have_no_body() {
        let (mut server, mut raw) = open_server(Config::new()).await;

        server.close(Some(CloseReason::new(CloseReason::ABNORMAL, "ignored"))).await.unwrap();
        drop(server);
        assert_eq!(read_to_end(&mut raw).await, [0x88, 0x00]);
    }

    #[tokio::test]
    async fn read_timeout_closes_with_1001() {
        let (mut server, mut raw) = open_server(Config::new().with_read_timeout(Duration::from_millis(20))).await;

        assert!(matches!(server.wait().await, Err(WsError::Timeout)));
        assert_eq!(server.state(), ConnectionState::Closed);

        drop(server);
        assert_eq!(read_to_end(&mut raw).await, close_frame(1001, "read timed out"));
    }

    #[tokio::test]
    async fn stream_end_without_close_is_abnormal() {
        let (mut server, raw) = open_server(Config::new()).await;
        drop(raw);

        assert!(matches!(server.read_message().await, Err(WsError::Io { .. })));
        assert_eq!(server.state(), ConnectionState::Closed);
        assert_eq!(server.close_reason().map(|reason| reason.code), Some(CloseReason::ABNORMAL));
    }

    #[tokio::test]
    async fn ping_payload_is_limited() {
        let (mut client, mut server) = open_pair(Config::new(), Config::new()).await;

        assert!(matches!(client.ping(&[0; 126]).await, Err(WsError::MessageTooLarge { .. })));
        client.ping(b"hi").await.unwrap();
        client.write(b"after").await.unwrap();
        client.send().await.unwrap();
        assert_eq!(server.read_message().await.unwrap(), Some(DataMessage::text("after")));

        // the pong is discarded while waiting for data
        server.send_message(&DataMessage::text("reply")).await.unwrap();
        assert_eq!(client.read_message().await.unwrap(), Some(DataMessage::text("reply")));
    }

    #[test]
    fn take_text_keeps_incomplete_sequences() {
        let mut buffer = BytesMut::from(&b"ab\xe2\x82"[..]);
        assert_eq!(&take_text(&mut buffer, false)[..], b"ab");
        assert_eq!(&buffer[..], b"\xe2\x82");

        buffer.put_u8(0xac);
        assert_eq!(&take_text(&mut buffer, true)[..], "€".as_bytes());
        assert!(buffer.is_empty());

        let mut buffer = BytesMut::from(&b"\xe2\x82"[..]);
        assert_eq!(&take_text(&mut buffer, true)[..], "â\u{82}".as_bytes());
    }
}

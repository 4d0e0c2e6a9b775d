//! Incremental decoder for HTTP/1.x requests and responses.
//!
//! The decoder walks through three phases and keeps all progress in itself and
//! in the source buffer, so input may arrive in arbitrary pieces:
//!
//! 1. **Start**: read the start line and classify it as a request or status line
//! 2. **Header**: read header fields until the empty line, tracking the single
//!    field allowed to describe the body size, then emit the [`Message`]
//! 3. **Body**: decode the payload with the framing chosen from the head and
//!    emit [`PayloadFragment`]s until `end_of_payload`
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use strand_http::codec::{MessageDecoder, MessageEvent};
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = MessageDecoder::new();
//! let mut buffer = BytesMut::from("POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
//!
//! let Some(MessageEvent::Message(message)) = decoder.decode(&mut buffer).unwrap() else { panic!() };
//! assert_eq!(message.target(), Some("/upload"));
//!
//! let Some(MessageEvent::Data(fragment)) = decoder.decode(&mut buffer).unwrap() else { panic!() };
//! assert_eq!(&fragment.data[..], b"hello");
//! assert!(fragment.end_of_payload);
//! ```

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

use crate::builder::ParserState;
use crate::codec::body::PayloadDecoder;
use crate::codec::header::{FieldLine, FieldLineDecoder};
use crate::codec::start_line::parse_start_line;
use crate::ensure;
use crate::protocol::header::FieldName;
use crate::protocol::message::last_coding;
use crate::protocol::{BodyFraming, HeaderField, Message, MessageConfig, ParseError, PayloadFragment};
use crate::utils::find_line_end;

/// What the decoder produces: a message head, then its body fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    Message(Message),
    Data(PayloadFragment),
}

impl MessageEvent {
    pub fn into_message(self) -> Option<Message> {
        match self {
            MessageEvent::Message(message) => Some(message),
            MessageEvent::Data(_) => None,
        }
    }

    pub fn into_fragment(self) -> Option<PayloadFragment> {
        match self {
            MessageEvent::Message(_) => None,
            MessageEvent::Data(fragment) => Some(fragment),
        }
    }
}

#[derive(Debug)]
pub struct MessageDecoder {
    config: Arc<MessageConfig>,
    state: DecodeState,
    /// How far the pending start line has been scanned.
    scanned: usize,
    field_decoder: FieldLineDecoder,
}

#[derive(Debug)]
enum DecodeState {
    Start,
    Header { message: Message, framing: Option<BodyFraming> },
    Body(PayloadDecoder),
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::with_config(Arc::new(MessageConfig::default()))
    }

    pub fn with_config(config: Arc<MessageConfig>) -> Self {
        let field_decoder = FieldLineDecoder::new(config.max_line_length());
        Self { config, state: DecodeState::Start, scanned: 0, field_decoder }
    }

    pub fn config(&self) -> &Arc<MessageConfig> {
        &self.config
    }

    /// The phase the decoder is in. Never [`ParserState::Error`]; errors are
    /// returned and the caller decides what to do with the decoder.
    pub fn state(&self) -> ParserState {
        match self.state {
            DecodeState::Start => ParserState::Start,
            DecodeState::Header { .. } => ParserState::Header,
            DecodeState::Body(_) => ParserState::Body,
        }
    }

    /// Drops any partially decoded message.
    pub fn reset(&mut self) {
        self.state = DecodeState::Start;
        self.scanned = 0;
        self.field_decoder.reset();
    }

    fn decode_next(&mut self, src: &mut BytesMut) -> Result<Option<MessageEvent>, ParseError> {
        loop {
            match &mut self.state {
                DecodeState::Start => {
                    if !self.read_start_line(src)? {
                        return Ok(None);
                    }
                }

                DecodeState::Header { message, framing } => match self.field_decoder.decode(src)? {
                    Some(FieldLine::Field(field)) => insert_header(&self.config, message, framing, field)?,
                    Some(FieldLine::End) => {
                        let head = std::mem::replace(&mut self.state, DecodeState::Start);
                        if let DecodeState::Header { message, framing } = head {
                            return Ok(Some(self.finish_head(message, framing)));
                        }
                    }
                    None => return Ok(None),
                },

                DecodeState::Body(payload_decoder) => {
                    return match payload_decoder.decode(src)? {
                        Some(fragment) => Ok(Some(self.emit_fragment(fragment))),
                        None => Ok(None),
                    };
                }
            }
        }
    }

    /// Returns false if the start line is not complete yet.
    fn read_start_line(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let line_end = match find_line_end(src, &mut self.scanned, self.config.max_line_length()) {
            Ok(Some(line_end)) => line_end,
            Ok(None) => return Ok(false),
            Err(()) => return Err(ParseError::LineLengthExceeded),
        };
        ensure!(line_end > 0 && src[line_end - 1] == b'\r', ParseError::StartLineParserError);

        let line = src.split_to(line_end + 1);
        let traits = parse_start_line(&line[..line_end - 1])?;

        self.field_decoder.reset();
        self.state = DecodeState::Header { message: Message::new(traits), framing: None };
        trace!("parsing header section");
        Ok(true)
    }

    fn finish_head(&mut self, message: Message, framing: Option<BodyFraming>) -> MessageEvent {
        let framing = if !message.permit_body() {
            BodyFraming::None
        } else {
            match framing {
                Some(framing) => framing,
                None if message.is_response() => BodyFraming::Continuous,
                None => BodyFraming::None,
            }
        };
        trace!(?framing, headers = message.headers().len(), "parsed message head");

        let payload_decoder = PayloadDecoder::new(framing, Arc::clone(&self.config));
        if !payload_decoder.is_finished() {
            self.state = DecodeState::Body(payload_decoder);
        }
        MessageEvent::Message(message)
    }

    fn emit_fragment(&mut self, fragment: PayloadFragment) -> MessageEvent {
        trace!(len = fragment.len(), end_of_payload = fragment.end_of_payload, "decoded payload fragment");
        if fragment.end_of_payload {
            self.state = DecodeState::Start;
        }
        MessageEvent::Data(fragment)
    }
}

/// Appends a field to the message under construction, deciding the body
/// framing when the field describes the body size.
fn insert_header(
    config: &MessageConfig,
    message: &mut Message,
    framing: &mut Option<BodyFraming>,
    mut field: HeaderField,
) -> Result<(), ParseError> {
    ensure!(message.headers().len() < config.max_header_limit(), ParseError::HeaderLimitExceeded);

    if !field.describes_body_size() {
        message.headers_mut().push(field);
        return Ok(());
    }
    ensure!(framing.is_none(), ParseError::DuplicateBodyHeaders);

    if field.is(FieldName::ContentLength) {
        let value = field.value();
        ensure!(!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()), ParseError::HeaderLineParserError);
        let length = value.parse::<u64>().map_err(|_| ParseError::HeaderLineParserError)?;
        *framing = Some(BodyFraming::ContentLength(length));
        message.headers_mut().push(field);
        return Ok(());
    }

    // Transfer-Encoding
    match last_coding(field.value()) {
        Some(coding) if coding.eq_ignore_ascii_case("chunked") => {
            *framing = Some(BodyFraming::Chunked);
            let remaining = match field.value().rfind(',') {
                Some(comma) => field.value()[..comma].trim().to_owned(),
                None => String::new(),
            };
            if !remaining.is_empty() {
                field.set_value(&remaining)?;
                message.headers_mut().push(field);
            }
        }
        _ if message.is_response() => {
            *framing = Some(BodyFraming::Continuous);
            message.headers_mut().push(field);
        }
        _ => return Err(ParseError::HeaderLineParserError),
    }
    Ok(())
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageDecoder {
    type Item = MessageEvent;
    type Error = ParseError;

    /// Attempts to decode the next event from the provided buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(MessageEvent::Message(_)))`: a complete message head
    /// - `Ok(Some(MessageEvent::Data(_)))`: a body fragment
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the stream is malformed and cannot be resynchronized
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_next(src).inspect_err(|e| warn!(cause = %e, "failed to decode http message"))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }

        match &mut self.state {
            DecodeState::Start if src.is_empty() => Ok(None),
            DecodeState::Body(payload_decoder) => match payload_decoder.decode_eof(src)? {
                Some(fragment) => Ok(Some(self.emit_fragment(fragment))),
                None => Ok(None),
            },
            _ => {
                warn!("end of stream inside an http message");
                Err(ParseError::BodyParserError)
            }
        }
    }
}

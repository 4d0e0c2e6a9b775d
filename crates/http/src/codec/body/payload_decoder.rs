//! Decoder for HTTP message payloads.
//!
//! Dispatches to the strategy chosen from the message head:
//! - Content-Length based payloads
//! - Chunked transfer coding
//! - Continuous payloads that end when the transport closes
//! - Messages with no body

use std::sync::Arc;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{BodyFraming, MessageConfig, ParseError, PayloadFragment};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Pass everything through until end of stream
    Continuous { finished: bool },

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    pub fn new(framing: BodyFraming, config: Arc<MessageConfig>) -> Self {
        let kind = match framing {
            BodyFraming::None | BodyFraming::ContentLength(0) => Kind::NoBody,
            BodyFraming::ContentLength(length) => Kind::Length(LengthDecoder::new(length)),
            BodyFraming::Chunked => Kind::Chunked(ChunkedDecoder::new(config)),
            BodyFraming::Continuous => Kind::Continuous { finished: false },
        };
        Self { kind }
    }

    /// Returns true once the fragment with `end_of_payload` has been produced.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(decoder) => decoder.is_finished(),
            Kind::Chunked(decoder) => decoder.is_finished(),
            Kind::Continuous { finished } => *finished,
            Kind::NoBody => true,
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadFragment;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::Continuous { finished } => {
                if *finished || src.is_empty() {
                    return Ok(None);
                }
                let data = src.split().freeze();
                Ok(Some(PayloadFragment::continuous(data, false)))
            }
            Kind::NoBody => Ok(None),
        }
    }

    /// At end of stream a continuous body completes with an empty fragment;
    /// any other unfinished body is truncated.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(fragment) = self.decode(src)? {
            return Ok(Some(fragment));
        }

        if let Kind::Continuous { finished } = &mut self.kind
            && !*finished
        {
            *finished = true;
            trace!("continuous payload ended by end of stream");
            return Ok(Some(PayloadFragment::continuous(Default::default(), true)));
        }

        if self.is_finished() { Ok(None) } else { Err(ParseError::BodyParserError) }
    }
}

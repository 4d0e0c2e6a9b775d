use std::sync::Arc;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{BodyFraming, MessageConfig, PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};

use tokio_util::codec::Encoder;

/// Encodes a message body with the framing its head declares.
#[derive(Debug)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// raw bytes until the connection closes
    Continuous { eof: bool },

    /// no body at all
    NoBody,
}

impl PayloadEncoder {
    pub fn new(framing: BodyFraming, config: Arc<MessageConfig>) -> Self {
        let kind = match framing {
            BodyFraming::None => Kind::NoBody,
            BodyFraming::ContentLength(length) => Kind::Length(LengthEncoder::new(length)),
            BodyFraming::Chunked => Kind::Chunked(ChunkedEncoder::with_config(config)),
            BodyFraming::Continuous => Kind::Continuous { eof: false },
        };
        Self { kind }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::Continuous { eof } => *eof,
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Continuous { eof } => {
                match item {
                    PayloadItem::Chunk(bytes) => dst.put(bytes),
                    PayloadItem::Eof => *eof = true,
                }
                Ok(())
            }
            Kind::NoBody => match item {
                PayloadItem::Chunk(bytes) if bytes.has_remaining() => {
                    Err(SendError::invalid_body("message does not permit a body"))
                }
                _ => Ok(()),
            },
        }
    }
}

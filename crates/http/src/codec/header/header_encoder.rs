//! Serializes a message head: start line, header fields and the empty line.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{Message, SendError};
use crate::utils::FastWrite;

/// Initial buffer size reserved for a message head
const INIT_HEADER_SIZE: usize = 1024;

/// Writes a [`Message`] head exactly as its header list describes it.
///
/// Framing headers are not added or rewritten; the caller decides them when
/// building the message.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<&Message> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{}\r\n", message.traits())?;

        for field in message.headers() {
            dst.put_slice(field.name().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(field.value().as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

//! Decoder for bodies delimited by Content-Length, see
//! [RFC 9112 Section 6.2](https://www.rfc-editor.org/rfc/rfc9112#section-6.2).

use std::cmp;

use crate::protocol::{ParseError, PayloadFragment};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Emits whatever part of the remaining body is buffered, marking the
/// fragment that completes it with `end_of_payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes remaining to be read from the payload
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    pub fn is_finished(&self) -> bool {
        self.length == 0
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadFragment;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 || src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.length, src.len() as u64);
        #[allow(clippy::cast_possible_truncation, reason = "bounded by the buffered length")]
        let bytes = src.split_to(len as usize).freeze();

        self.length -= len;
        Ok(Some(PayloadFragment::new(bytes, self.length == 0)))
    }
}

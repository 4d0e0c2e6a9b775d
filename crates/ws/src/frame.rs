//! Frame header codec.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! ```
//!
//! Only the header goes through the codec. Payload bytes are masked and
//! unmasked on demand through a [`FrameContext`], so a frame never needs to be
//! held in memory as a whole.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::ensure;
use crate::error::FrameError;
use crate::mask::Masker;

/// Largest payload that fits the 7-bit length.
pub const MAX_SHORT_LENGTH: u64 = 125;
const EXTENDED_16: u8 = 126;
const EXTENDED_64: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    pub const fn is_control(self) -> bool {
        (self as u8) >= 0x8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    /// RSV1 to RSV3, in the low three bits.
    pub reserved: u8,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload_length: u64,
    pub mask_key: [u8; 4],
}

impl FrameHeader {
    pub fn new(opcode: OpCode, fin: bool, payload_length: u64) -> Self {
        Self { fin, reserved: 0, opcode, masked: false, payload_length, mask_key: [0; 4] }
    }

    #[must_use]
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.masked = true;
        self.mask_key = key;
        self
    }

    /// Size of the encoded header in bytes.
    pub fn header_size(&self) -> usize {
        let length = match self.payload_length {
            0..=MAX_SHORT_LENGTH => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        2 + length + if self.masked { 4 } else { 0 }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.header_size());

        let fin = if self.fin { 0x80 } else { 0x00 };
        dst.put_u8(fin | ((self.reserved & 0x7) << 4) | self.opcode as u8);

        let mask = if self.masked { 0x80 } else { 0x00 };
        match self.payload_length {
            #[allow(clippy::cast_possible_truncation, reason = "at most 125")]
            length @ 0..=MAX_SHORT_LENGTH => dst.put_u8(mask | length as u8),
            #[allow(clippy::cast_possible_truncation, reason = "at most 0xFFFF")]
            length @ 126..=0xFFFF => {
                dst.put_u8(mask | EXTENDED_16);
                dst.put_u16(length as u16);
            }
            length => {
                dst.put_u8(mask | EXTENDED_64);
                dst.put_u64(length);
            }
        }

        if self.masked {
            dst.put_slice(&self.mask_key);
        }
    }

    pub fn context(&self) -> FrameContext {
        FrameContext::new(*self)
    }
}

/// Decodes frame headers, waiting until the whole header is buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameHeaderDecoder;

impl Decoder for FrameHeaderDecoder {
    type Item = FrameHeader;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let &[first, second, ..] = &src[..] else {
            return Ok(None);
        };

        let masked = second & 0x80 != 0;
        let short = second & 0x7F;
        let length_size = match short {
            EXTENDED_16 => 2,
            EXTENDED_64 => 8,
            _ => 0,
        };
        let header_size = 2 + length_size + if masked { 4 } else { 0 };
        if src.len() < header_size {
            return Ok(None);
        }

        let opcode = OpCode::from_u8(first & 0x0F).ok_or(FrameError::UnknownOpcode(first & 0x0F))?;

        src.advance(2);
        let payload_length = match short {
            EXTENDED_16 => u64::from(src.get_u16()),
            EXTENDED_64 => src.get_u64(),
            length => u64::from(length),
        };
        ensure!(payload_length >> 63 == 0, FrameError::InvalidLength);

        let mut mask_key = [0; 4];
        if masked {
            src.copy_to_slice(&mut mask_key);
        }

        let header = FrameHeader {
            fin: first & 0x80 != 0,
            reserved: (first >> 4) & 0x7,
            opcode,
            masked,
            payload_length,
            mask_key,
        };
        trace!(opcode = ?header.opcode, fin = header.fin, length = header.payload_length, "decoded frame header");
        Ok(Some(header))
    }
}

/// Writes frame headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameHeaderEncoder;

impl Encoder<FrameHeader> for FrameHeaderEncoder {
    type Error = FrameError;

    fn encode(&mut self, header: FrameHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(header.payload_length >> 63 == 0, FrameError::InvalidLength);
        header.encode(dst);
        Ok(())
    }
}

/// Progress through the payload of one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    header: FrameHeader,
    remaining: u64,
    masker: Option<Masker>,
}

impl FrameContext {
    pub fn new(header: FrameHeader) -> Self {
        let masker = header.masked.then(|| Masker::new(header.mask_key));
        Self { header, remaining: header.payload_length, masker }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Payload bytes not yet consumed.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// How many of `available` bytes may be consumed next.
    pub fn next_len(&self, available: usize) -> usize {
        usize::try_from(self.remaining).map_or(available, |remaining| remaining.min(available))
    }

    /// Unmasks (or masks) the next `data.len()` payload bytes in place.
    ///
    /// `data` must not be longer than [`Self::remaining`].
    pub fn consume(&mut self, data: &mut [u8]) {
        debug_assert!(data.len() as u64 <= self.remaining);
        if let Some(masker) = &mut self.masker {
            masker.apply(data);
        }
        self.remaining -= data.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
        FrameHeaderDecoder.decode(&mut BytesMut::from(bytes))
    }

    #[test]
    fn length_codes() {
        for (length, size) in [(0, 2), (125, 2), (126, 4), (0xFFFF, 4), (0x1_0000, 10)] {
            let header = FrameHeader::new(OpCode::Binary, true, length);
            let mut dst = BytesMut::new();
            header.encode(&mut dst);
            assert_eq!(dst.len(), size);
            assert_eq!(header.header_size(), size);
            assert_eq!(decode(&dst).unwrap(), Some(header));
        }
    }

    #[test]
    fn masked_payload_survives_in_pieces() {
        for length in [0, 125, 126, 65536] {
            let payload: Vec<u8> = (0..length).map(|i| (i % 251) as u8).collect();
            let header = FrameHeader::new(OpCode::Binary, true, length as u64).with_mask([0xA1, 0x02, 0xFF, 0x5C]);

            let mut wire = BytesMut::new();
            header.encode(&mut wire);
            let start = wire.len();
            wire.extend_from_slice(&payload);
            header.context().consume(&mut wire[start..]);
            assert!(length == 0 || wire[start..] != payload[..]);

            let decoded = FrameHeaderDecoder.decode(&mut wire).unwrap().unwrap();
            assert_eq!(decoded, header);
            let mut context = decoded.context();
            for piece in wire.chunks_mut(7) {
                context.consume(piece);
            }
            assert!(context.is_finished());
            assert_eq!(&wire[..], &payload[..]);
        }
    }

    #[test]
    fn rfc_examples() {
        // a single-frame unmasked text message
        let header = decode(&[0x81, 0x05, 0x48, 0x65]).unwrap().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert!(!header.masked);
        assert_eq!(header.payload_length, 5);

        // a single-frame masked text message
        let mut src = BytesMut::from(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..]);
        let header = FrameHeaderDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(header.mask_key, [0x37, 0xfa, 0x21, 0x3d]);
        let mut context = header.context();
        context.consume(&mut src[..]);
        assert_eq!(&src[..], b"Hello");
        assert!(context.is_finished());

        // 256 bytes binary message in a single unmasked frame
        let header = decode(&[0x82, 0x7E, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!(header.opcode, OpCode::Binary);
        assert_eq!(header.payload_length, 256);

        // 64KiB binary message in a single unmasked frame
        let header = decode(&[0x82, 0x7F, 0, 0, 0, 0, 0, 1, 0, 0]).unwrap().unwrap();
        assert_eq!(header.payload_length, 65536);
    }

    #[test]
    fn waits_for_the_whole_header() {
        let wire = [0x82, 0xFE, 0x01, 0x00, 1, 2, 3, 4];
        let mut decoder = FrameHeaderDecoder;
        let mut src = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            src.put_u8(*byte);
            let decoded = decoder.decode(&mut src).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none());
                assert_eq!(src.len(), i + 1);
            } else {
                let header = decoded.unwrap();
                assert!(header.masked);
                assert_eq!(header.mask_key, [1, 2, 3, 4]);
                assert_eq!(header.payload_length, 256);
                assert!(src.is_empty());
            }
        }
    }

    #[test]
    fn reserved_bits_and_fin() {
        let header = decode(&[0x70, 0x00]).unwrap().unwrap();
        assert!(!header.fin);
        assert_eq!(header.reserved, 0x7);
        assert_eq!(header.opcode, OpCode::Continuation);

        let mut dst = BytesMut::new();
        header.encode(&mut dst);
        assert_eq!(&dst[..], &[0x70, 0x00]);
    }

    #[test]
    fn rejects_unknown_opcodes() {
        for opcode in [0x3, 0x7, 0xB, 0xF] {
            assert_eq!(decode(&[0x80 | opcode, 0x00]), Err(FrameError::UnknownOpcode(opcode)));
        }
    }

    #[test]
    fn rejects_length_with_most_significant_bit() {
        assert_eq!(decode(&[0x82, 0x7F, 0x80, 0, 0, 0, 0, 0, 0, 0]), Err(FrameError::InvalidLength));

        let header = FrameHeader::new(OpCode::Binary, true, 1 << 63);
        assert_eq!(FrameHeaderEncoder.encode(header, &mut BytesMut::new()), Err(FrameError::InvalidLength));
    }

    #[test]
    fn control_opcodes() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Continuation.is_control());
    }

    #[test]
    fn next_len_is_bounded_by_the_payload() {
        let context = FrameHeader::new(OpCode::Text, true, 10).context();
        assert_eq!(context.next_len(4), 4);
        assert_eq!(context.next_len(64), 10);
    }
}

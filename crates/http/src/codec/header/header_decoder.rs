//! Incremental decoder for a header (or trailer) section.
//!
//! The section is read one field at a time. A field is only complete once the
//! first byte of the following line is known: a following line that starts
//! with SP or HTAB is an obsolete fold and belongs to the same field. The
//! section ends with an empty line.
//!
//! Field count limits and the meaning of individual fields are left to the
//! caller; this decoder only splits and validates lines.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::header::is_whitespace;
use crate::protocol::{HeaderField, ParseError};
use crate::utils::find_line_end;

/// One step through a header section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldLine {
    Field(HeaderField),
    /// The empty line closing the section has been consumed.
    End,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldLineDecoder {
    max_line_length: usize,
    /// Bytes of complete lines that belong to the field being assembled.
    field_end: usize,
    /// How far the current, incomplete line has been scanned.
    scanned: usize,
}

impl FieldLineDecoder {
    pub(crate) fn new(max_line_length: usize) -> Self {
        Self { max_line_length, field_end: 0, scanned: 0 }
    }

    pub(crate) fn reset(&mut self) {
        self.field_end = 0;
        self.scanned = 0;
    }

    fn take_field(&mut self, src: &mut BytesMut) -> Result<HeaderField, ParseError> {
        let raw = src.split_to(self.field_end);
        self.field_end = 0;
        let field = HeaderField::parse(&raw)?;
        trace!(name = field.name(), value = field.value(), "decoded header field");
        Ok(field)
    }
}

impl Decoder for FieldLineDecoder {
    type Item = FieldLine;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let rest = &src[self.field_end..];
            let Some(&first) = rest.first() else {
                return Ok(None);
            };

            if self.field_end == 0 {
                match first {
                    b'\r' => {
                        let Some(&second) = rest.get(1) else {
                            return Ok(None);
                        };
                        ensure!(second == b'\n', ParseError::HeaderLineParserError);
                        src.advance(2);
                        return Ok(Some(FieldLine::End));
                    }
                    // a fold needs a field to continue
                    b if is_whitespace(b) => return Err(ParseError::HeaderLineParserError),
                    _ => {}
                }
            } else if !is_whitespace(first) {
                return self.take_field(src).map(|field| Some(FieldLine::Field(field)));
            }

            let line_end = match find_line_end(rest, &mut self.scanned, self.max_line_length) {
                Ok(Some(line_end)) => line_end,
                Ok(None) => return Ok(None),
                Err(()) => return Err(ParseError::LineLengthExceeded),
            };
            ensure!(line_end > 0 && rest[line_end - 1] == b'\r', ParseError::HeaderLineParserError);

            self.field_end += line_end + 1;
            // folded continuation lines count towards the same limit
            ensure!(self.field_end <= self.max_line_length + 2, ParseError::LineLengthExceeded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode_all(decoder: &mut FieldLineDecoder, src: &mut BytesMut) -> Result<Vec<FieldLine>, ParseError> {
        let mut lines = vec![];
        while let Some(line) = decoder.decode(src)? {
            let end = line == FieldLine::End;
            lines.push(line);
            if end {
                break;
            }
        }
        Ok(lines)
    }

    fn field(line: &FieldLine) -> (&str, &str) {
        match line {
            FieldLine::Field(field) => (field.name(), field.value()),
            FieldLine::End => ("", ""),
        }
    }

    #[test]
    fn decodes_section() {
        let str = indoc! {r##"
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept:   */*

        body"##};
        let mut src = BytesMut::from(str.replace('\n', "\r\n").as_str());

        let mut decoder = FieldLineDecoder::new(8000);
        let lines = decode_all(&mut decoder, &mut src).unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(field(&lines[0]), ("Host", "127.0.0.1:8080"));
        assert_eq!(field(&lines[1]), ("User-Agent", "curl/7.79.1"));
        assert_eq!(field(&lines[2]), ("Accept", "*/*"));
        assert_eq!(lines[3], FieldLine::End);
        assert_eq!(&src[..], b"body");
    }

    #[test]
    fn waits_for_next_line_before_emitting() {
        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::from("Name: value\r\n");
        assert_eq!(decoder.decode(&mut src).unwrap(), None);

        src.extend_from_slice(b" folded\r\n");
        assert_eq!(decoder.decode(&mut src).unwrap(), None);

        src.extend_from_slice(b"\r");
        let line = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(field(&line), ("Name", "value folded"));

        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        src.extend_from_slice(b"\n");
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(FieldLine::End));
        assert!(src.is_empty());
    }

    #[test]
    fn byte_at_a_time() {
        let input = b"A: 1\r\nB: 2\r\n\t3\r\n\r\n";
        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::new();
        let mut lines = vec![];
        for b in input {
            src.extend_from_slice(&[*b]);
            while let Some(line) = decoder.decode(&mut src).unwrap() {
                lines.push(line);
            }
        }
        assert_eq!(lines.len(), 3);
        assert_eq!(field(&lines[0]), ("A", "1"));
        assert_eq!(field(&lines[1]), ("B", "2 3"));
        assert_eq!(lines[2], FieldLine::End);
    }

    #[test]
    fn fold_without_field() {
        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::from(" orphan\r\n\r\n");
        assert_eq!(decoder.decode(&mut src), Err(ParseError::HeaderLineParserError));
    }

    #[test]
    fn bare_line_feed() {
        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::from("Name: value\nOther: x\r\n\r\n");
        assert_eq!(decode_all(&mut decoder, &mut src), Err(ParseError::HeaderLineParserError));

        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::from("\n");
        assert_eq!(decoder.decode(&mut src), Err(ParseError::HeaderLineParserError));
    }

    #[test]
    fn invalid_field() {
        let mut decoder = FieldLineDecoder::new(8000);
        let mut src = BytesMut::from("Bad Name: value\r\n\r\n");
        assert_eq!(decode_all(&mut decoder, &mut src), Err(ParseError::HeaderLineParserError));
    }

    #[test]
    fn line_too_long() {
        let mut decoder = FieldLineDecoder::new(16);
        let mut src = BytesMut::from("Name: 0123456789abcdef\r\n\r\n");
        assert_eq!(decode_all(&mut decoder, &mut src), Err(ParseError::LineLengthExceeded));

        let mut decoder = FieldLineDecoder::new(16);
        let mut src = BytesMut::from("Name: 012345\r\n 6789abcdef\r\n\r\n");
        assert_eq!(decode_all(&mut decoder, &mut src), Err(ParseError::LineLengthExceeded));
    }
}

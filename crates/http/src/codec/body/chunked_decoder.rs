//! Decoder for the chunked transfer coding, see
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! Each chunk is delivered as one fragment once its data and the trailing CRLF
//! are buffered, so the fragment sequence does not depend on how the input was
//! split. The zero-size chunk switches to the trailer section, which follows
//! the header field rules. Its end produces a final, empty fragment carrying
//! the terminal chunk's extensions and the kept trailers.

use std::mem;
use std::sync::Arc;
use std::task::Poll;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::header::{FieldLine, FieldLineDecoder};
use crate::protocol::{ChunkExtension, ChunkHeader, HeaderList, MessageConfig, ParseError, PayloadFragment};
use crate::utils::find_line_end;
use ChunkedState::*;

#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    config: Arc<MessageConfig>,
    scanned: usize,
    trailer_decoder: FieldLineDecoder,
    last_extensions: Vec<ChunkExtension>,
    trailers: HeaderList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk-size line
    Size,
    /// Read chunk data plus its CRLF
    Data { size: usize, extensions: Vec<ChunkExtension> },
    /// Read trailer fields up to the empty line
    Trailer,
    /// The terminal fragment has been produced
    End,
}

impl ChunkedDecoder {
    pub fn new(config: Arc<MessageConfig>) -> Self {
        let trailer_decoder = FieldLineDecoder::new(config.max_line_length());
        Self {
            state: Size,
            config,
            scanned: 0,
            trailer_decoder,
            last_extensions: Vec::new(),
            trailers: HeaderList::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    fn step(&mut self, src: &mut BytesMut) -> Poll<Result<Option<PayloadFragment>, ParseError>> {
        match &mut self.state {
            Size => self.read_size(src),
            Data { size, extensions } => {
                let (size, extensions) = (*size, mem::take(extensions));
                self.read_data(src, size, extensions)
            }
            Trailer => self.read_trailer(src),
            End => Poll::Ready(Ok(None)),
        }
    }

    fn read_size(&mut self, src: &mut BytesMut) -> Poll<Result<Option<PayloadFragment>, ParseError>> {
        let line_end = match find_line_end(src, &mut self.scanned, self.config.max_line_length()) {
            Ok(Some(line_end)) => line_end,
            Ok(None) => return Poll::Pending,
            Err(()) => return Poll::Ready(Err(ParseError::LineLengthExceeded)),
        };
        if line_end == 0 || src[line_end - 1] != b'\r' {
            return Poll::Ready(Err(ParseError::BodyParserError));
        }

        let line = src.split_to(line_end + 1);
        let header = match ChunkHeader::parse(&line[..line_end - 1], self.config.chunk_size_limit()) {
            Ok(header) => header,
            Err(e) => return Poll::Ready(Err(e.into())),
        };
        trace!(size = header.size, extensions = header.extensions.len(), "read chunk size");

        self.state = if header.size == 0 {
            self.last_extensions = header.extensions;
            Trailer
        } else {
            // bounded by the chunk size limit
            let Ok(size) = usize::try_from(header.size) else {
                return Poll::Ready(Err(ParseError::ChunkLimitExceeded));
            };
            Data { size, extensions: header.extensions }
        };
        Poll::Ready(Ok(None))
    }

    fn read_data(
        &mut self,
        src: &mut BytesMut,
        size: usize,
        extensions: Vec<ChunkExtension>,
    ) -> Poll<Result<Option<PayloadFragment>, ParseError>> {
        let delimiter_ok = match src.len().saturating_sub(size) {
            0 => true,
            1 => src[size] == b'\r',
            _ => &src[size..size + 2] == b"\r\n",
        };
        if !delimiter_ok {
            return Poll::Ready(Err(ParseError::BodyParserError));
        }

        if src.len() < size + 2 {
            self.state = Data { size, extensions };
            return Poll::Pending;
        }

        let data = src.split_to(size).freeze();
        src.advance(2);
        self.state = Size;
        trace!(len = data.len(), "read chunk data");

        Poll::Ready(Ok(Some(PayloadFragment { extensions, ..PayloadFragment::new(data, false) })))
    }

    fn read_trailer(&mut self, src: &mut BytesMut) -> Poll<Result<Option<PayloadFragment>, ParseError>> {
        loop {
            match self.trailer_decoder.decode(src) {
                Ok(Some(FieldLine::Field(field))) => {
                    if field.describes_body_size() || self.config.is_forbidden_trailer(field.name()) {
                        debug!(name = field.name(), "dropping forbidden trailer");
                        continue;
                    }
                    if self.trailers.len() >= self.config.max_header_limit() {
                        return Poll::Ready(Err(ParseError::HeaderLimitExceeded));
                    }
                    self.trailers.push(field);
                }
                Ok(Some(FieldLine::End)) => {
                    self.state = End;
                    trace!(trailers = self.trailers.len(), "finished reading chunked data");
                    return Poll::Ready(Ok(Some(PayloadFragment {
                        extensions: mem::take(&mut self.last_extensions),
                        trailers: mem::take(&mut self.trailers),
                        ..PayloadFragment::new(Default::default(), true)
                    })));
                }
                Ok(None) => return Poll::Pending,
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadFragment;
    type Error = ParseError;

    /// Decodes the next complete chunk.
    ///
    /// # Returns
    /// - `Ok(Some(fragment))` for each data chunk, then once for the terminal chunk
    ///   with `end_of_payload` set
    /// - `Ok(None)` when more data is needed, or after the terminal chunk
    /// - `Err(ParseError)` if the chunked coding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End || src.is_empty() {
                return Ok(None);
            }

            match self.step(src) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(Some(fragment))) => return Ok(Some(fragment)),
                Poll::Ready(Ok(None)) => {}
                Poll::Ready(Err(e)) => return Err(e),
            }
        }
    }
}

//! Encoder for the chunked transfer coding.
//!
//! A non-empty payload becomes `<hex-size>[;ext]*\r\n<payload>\r\n`, an empty
//! one the terminal chunk `0[;ext]*\r\n[trailer\r\n]*\r\n`. An optional
//! [`ChunkObserver`] supplies extensions and trailers.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::protocol::{ChunkExtension, HeaderList, MessageConfig, PayloadItem, SendError};
use crate::utils::FastWrite;

/// Hook for decorating outgoing chunks.
pub trait ChunkObserver {
    /// Called before a data chunk is written.
    fn on_next_chunk(&mut self, extensions: &mut Vec<ChunkExtension>, data: &[u8]) {
        let _ = (extensions, data);
    }

    /// Called before the terminal chunk is written. Trailers whose name is
    /// forbidden are dropped afterwards.
    fn on_last_chunk(&mut self, extensions: &mut Vec<ChunkExtension>, trailers: &mut HeaderList) {
        let _ = (extensions, trailers);
    }
}

pub struct ChunkedEncoder {
    eof: bool,
    config: Arc<MessageConfig>,
    observer: Option<Box<dyn ChunkObserver + Send>>,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self::with_config(Arc::new(MessageConfig::default()))
    }

    pub fn with_config(config: Arc<MessageConfig>) -> Self {
        Self { eof: false, config, observer: None }
    }

    pub fn with_observer(mut self, observer: impl ChunkObserver + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn ChunkObserver + Send>>) {
        self.observer = observer;
    }

    /// Returns true once the terminal chunk has been written.
    pub fn is_finish(&self) -> bool {
        self.eof
    }

    /// Writes `data` as one chunk; empty `data` writes the terminal chunk.
    pub fn encode_chunk(&mut self, data: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
        if self.eof {
            warn!("encode chunk after the terminal chunk");
            return Err(SendError::invalid_body("chunked body already finished"));
        }

        let mut extensions = Vec::new();

        if data.is_empty() {
            let mut trailers = HeaderList::new();
            if let Some(observer) = &mut self.observer {
                observer.on_last_chunk(&mut extensions, &mut trailers);
            }

            dst.put_u8(b'0');
            write_extensions(&extensions, dst)?;
            for field in &trailers {
                if field.describes_body_size() || self.config.is_forbidden_trailer(field.name()) {
                    debug!(name = field.name(), "dropping forbidden trailer");
                    continue;
                }
                write!(FastWrite(dst), "{field}")?;
            }
            dst.put_slice(b"\r\n");
            self.eof = true;
            return Ok(());
        }

        if let Some(observer) = &mut self.observer {
            observer.on_next_chunk(&mut extensions, data);
        }

        dst.reserve(data.len() + 12);
        write!(FastWrite(dst), "{:X}", data.len())?;
        write_extensions(&extensions, dst)?;
        dst.put_slice(data);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn write_extensions(extensions: &[ChunkExtension], dst: &mut BytesMut) -> Result<(), SendError> {
    for extension in extensions {
        write!(FastWrite(dst), "{extension}")?;
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChunkedEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedEncoder")
            .field("eof", &self.eof)
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            // an empty chunk would end the body early
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(mut bytes) => {
                let data = bytes.copy_to_bytes(bytes.remaining());
                self.encode_chunk(&data, dst)
            }
            PayloadItem::Eof => self.encode_chunk(&[], dst),
        }
    }
}

//! Push-driven HTTP message parsing.
//!
//! [`MessageBuilder`] owns a receive buffer and a [`MessageDecoder`]. Bytes are
//! handed over with [`MessageBuilder::write`] as they arrive; every complete
//! message head and body fragment is passed to a [`MessageObserver`] before
//! `write` returns. A parse error is reported once through
//! [`MessageObserver::on_error`], after which input is ignored until
//! [`MessageBuilder::clear`].
//!
//! ```
//! use strand_http::builder::{MessageBuilder, MessageObserver};
//! use strand_http::protocol::{Message, ParseError, PayloadFragment};
//!
//! #[derive(Default)]
//! struct Collect {
//!     targets: Vec<String>,
//!     body: Vec<u8>,
//! }
//!
//! impl MessageObserver for Collect {
//!     fn on_message(&mut self, message: Message) {
//!         self.targets.extend(message.target().map(str::to_owned));
//!     }
//!
//!     fn on_data(&mut self, fragment: PayloadFragment) {
//!         self.body.extend_from_slice(&fragment.data);
//!     }
//!
//!     fn on_error(&mut self, _error: ParseError) {}
//! }
//!
//! let mut builder = MessageBuilder::new(Collect::default());
//! builder.write(b"POST /form HTTP/1.1\r\nContent-Le");
//! builder.write(b"ngth: 3\r\n\r\nabc");
//!
//! assert_eq!(builder.observer().targets, ["/form"]);
//! assert_eq!(builder.observer().body, b"abc");
//! ```

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::{MessageDecoder, MessageEvent};
use crate::protocol::{Message, MessageConfig, ParseError, PayloadFragment};

/// Receives what a [`MessageBuilder`] parses.
pub trait MessageObserver {
    /// A complete message head. Its body, if any, follows as fragments.
    fn on_message(&mut self, message: Message);

    /// A piece of the current message body.
    fn on_data(&mut self, fragment: PayloadFragment);

    /// The builder hit a fatal error and stopped.
    fn on_error(&mut self, error: ParseError);
}

impl<T: MessageObserver + ?Sized> MessageObserver for &mut T {
    fn on_message(&mut self, message: Message) {
        (**self).on_message(message);
    }

    fn on_data(&mut self, fragment: PayloadFragment) {
        (**self).on_data(fragment);
    }

    fn on_error(&mut self, error: ParseError) {
        (**self).on_error(error);
    }
}

impl<T: MessageObserver + ?Sized> MessageObserver for Box<T> {
    fn on_message(&mut self, message: Message) {
        (**self).on_message(message);
    }

    fn on_data(&mut self, fragment: PayloadFragment) {
        (**self).on_data(fragment);
    }

    fn on_error(&mut self, error: ParseError) {
        (**self).on_error(error);
    }
}

/// Top-level phase of a [`MessageBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserState {
    /// Waiting for a start line
    Start,
    /// Reading header fields
    Header,
    /// Reading a message body
    Body,
    /// Stopped after an error; only [`MessageBuilder::clear`] leaves this state
    Error,
}

#[derive(Debug)]
pub struct MessageBuilder<O> {
    decoder: MessageDecoder,
    buffer: BytesMut,
    observer: O,
    failed: bool,
}

impl<O: MessageObserver> MessageBuilder<O> {
    pub fn new(observer: O) -> Self {
        Self::with_config(observer, MessageConfig::default())
    }

    pub fn with_config(observer: O, config: MessageConfig) -> Self {
        let decoder = MessageDecoder::with_config(Arc::new(config));
        Self { decoder, buffer: BytesMut::new(), observer, failed: false }
    }

    /// Appends `bytes` to the receive buffer and parses as far as possible.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.failed {
            debug!(len = bytes.len(), "ignoring input after parse error");
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.run(MessageDecoder::decode);
    }

    /// Signals that the transport has closed.
    ///
    /// Completes a body that runs until end of stream with an empty
    /// `end_of_payload` fragment. A message cut off anywhere else is reported
    /// as [`ParseError::BodyParserError`].
    pub fn finish(&mut self) {
        if !self.failed {
            self.run(MessageDecoder::decode_eof);
        }
    }

    /// Drops all buffered input and parse progress, leaving the error state.
    pub fn clear(&mut self) {
        self.decoder.reset();
        self.buffer.clear();
        self.failed = false;
    }

    pub fn state(&self) -> ParserState {
        if self.failed { ParserState::Error } else { self.decoder.state() }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    fn run<F>(&mut self, mut step: F)
    where
        F: FnMut(&mut MessageDecoder, &mut BytesMut) -> Result<Option<MessageEvent>, ParseError>,
    {
        loop {
            match step(&mut self.decoder, &mut self.buffer) {
                Ok(Some(MessageEvent::Message(message))) => self.observer.on_message(message),
                Ok(Some(MessageEvent::Data(fragment))) => self.observer.on_data(fragment),
                Ok(None) => return,
                Err(e) => {
                    self.failed = true;
                    self.observer.on_error(e);
                    return;
                }
            }
        }
    }
}

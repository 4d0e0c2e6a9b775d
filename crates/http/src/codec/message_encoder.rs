use std::sync::Arc;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, MessageConfig, Part, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Serializes a message head followed by its body.
///
/// The body framing is taken from the head's headers, see
/// [`Message::body_framing`].
#[derive(Debug)]
pub struct MessageEncoder {
    config: Arc<MessageConfig>,
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::with_config(Arc::new(MessageConfig::default()))
    }

    pub fn with_config(config: Arc<MessageConfig>) -> Self {
        Self { config, header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Buf> Encoder<Part<Message, D>> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Part<Message, D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Part::Head(message) => {
                if self.payload_encoder.as_ref().is_some_and(|encoder| !encoder.is_finish()) {
                    error!("expect payload item but receive message head");
                    return Err(SendError::invalid_message("previous message body is unfinished"));
                }

                self.payload_encoder = Some(PayloadEncoder::new(message.body_framing(), Arc::clone(&self.config)));
                self.header_encoder.encode(&message, dst)
            }

            Part::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect message head but receive payload item");
                    return Err(SendError::invalid_message("payload without a message head"));
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

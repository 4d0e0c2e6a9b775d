//! Streaming codecs for HTTP/1.x messages.
//!
//! - [`MessageDecoder`]: turns raw bytes into [`MessageEvent`]s, one message
//!   head followed by its body fragments
//! - [`MessageEncoder`]: writes a message head and its body
//!
//! Both implement the `tokio_util` codec traits and can be driven by
//! `FramedRead`/`FramedWrite`, or fed by hand through a `BytesMut`.
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use strand_http::codec::MessageEncoder;
//! use strand_http::protocol::{FieldName, Message, Part};
//! use tokio_util::codec::Encoder;
//!
//! let message = Message::post("/echo").with_header(FieldName::TransferEncoding, "chunked").unwrap();
//!
//! let mut encoder = MessageEncoder::new();
//! let mut buffer = BytesMut::new();
//! encoder.encode(Part::<Message>::Head(message), &mut buffer).unwrap();
//! encoder.encode(Part::<Message>::from(Bytes::from_static(b"Hello World!")), &mut buffer).unwrap();
//! assert!(buffer.ends_with(b"C\r\nHello World!\r\n"));
//! ```

pub mod body;
mod header;
mod message_decoder;
mod message_encoder;
mod start_line;

pub use header::HeaderEncoder;
pub use message_decoder::{MessageDecoder, MessageEvent};
pub use message_encoder::MessageEncoder;

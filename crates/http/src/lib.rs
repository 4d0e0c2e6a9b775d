//! An incremental HTTP/1.1 message parser
//!
//! This crate parses HTTP/1.x requests and responses from a byte stream that may
//! arrive in arbitrary pieces, and serializes them back. It focuses on the wire
//! format: start lines, header fields, body framing and the chunked transfer
//! coding, and enforces configurable limits against hostile input.
//!
//! # Features
//!
//! - Requests and responses over the same decoder
//! - Resumes at any byte boundary; results do not depend on how input was split
//! - Content-Length, chunked and read-until-close bodies
//! - Chunk extensions and trailer fields, with forbidden trailers dropped
//! - Obsolete line folding in header and trailer fields
//! - Detection of conflicting body size headers
//! - `tokio_util` codecs as well as a push-driven observer interface
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use strand_http::codec::{MessageDecoder, MessageEvent};
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = MessageDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHel");
//!
//! let message = decoder.decode(&mut buffer).unwrap().and_then(MessageEvent::into_message).unwrap();
//! assert_eq!(message.headers().get("host"), Some("a"));
//!
//! // the first chunk is incomplete
//! assert!(decoder.decode(&mut buffer).unwrap().is_none());
//!
//! buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");
//! let hello = decoder.decode(&mut buffer).unwrap().and_then(MessageEvent::into_fragment).unwrap();
//! assert_eq!(&hello.data[..], b"Hello");
//!
//! let last = decoder.decode(&mut buffer).unwrap().and_then(MessageEvent::into_fragment).unwrap();
//! assert!(last.end_of_payload);
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: header fields, chunk grammar, messages, limits and errors
//! - [`codec`]: the streaming decoder and encoders
//! - [`builder`]: the push-driven [`builder::MessageBuilder`] that reports to a
//!   [`builder::MessageObserver`]
//!
//! # Limits
//!
//! The defaults of [`protocol::MessageConfig`]:
//!
//! - Maximum line length: 8000 bytes
//! - Maximum number of header or trailer fields: 50
//! - Maximum chunk size: 1,000,000 bytes
//!
//! # Error Handling
//!
//! Every [`protocol::ParseError`] is fatal for the stream being parsed: a
//! malformed HTTP/1.x stream cannot be resynchronized reliably.

pub mod builder;
pub mod codec;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;

//! Core HTTP protocol types.
//!
//! - **Header fields** ([`header`]): [`HeaderField`], [`FieldName`], [`HeaderList`]
//! - **Chunked coding grammar** ([`chunk`]): [`ChunkHeader`], [`ChunkExtension`]
//! - **Messages** ([`message`]): [`Message`] heads, [`PayloadFragment`]s produced
//!   by the decoder and [`Part`]s consumed by the encoder
//! - **Limits** ([`MessageConfig`])
//! - **Errors**: [`ParseError`] is what the decoder reports, [`HeaderError`] and
//!   [`ChunkError`] are the token level failures that map onto it

pub mod chunk;
pub use chunk::ChunkExtension;
pub use chunk::ChunkHeader;

pub mod header;
pub use header::FieldName;
pub use header::HeaderField;
pub use header::HeaderList;

pub mod message;
pub use message::BodyFraming;
pub use message::Message;
pub use message::MessageTraits;
pub use message::Part;
pub use message::PayloadFragment;
pub use message::PayloadItem;
pub use message::RequestLine;
pub use message::StatusLine;

mod config;
pub use config::MessageConfig;

mod error;
pub use error::ChunkError;
pub use error::HeaderError;
pub use error::ParseError;
pub use error::SendError;

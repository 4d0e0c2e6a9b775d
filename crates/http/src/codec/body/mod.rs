//! Message body framing.
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: chunked transfer coding, including extensions and trailers
//! - [`LengthDecoder`]: Content-Length delimited bodies
//! - [`PayloadDecoder`]: picks one of the above, or reads until end of stream
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: chunked transfer coding with an optional [`ChunkObserver`]
//! - [`LengthEncoder`]: Content-Length delimited bodies
//! - [`PayloadEncoder`]: picks one of the above from the message head

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkObserver;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;

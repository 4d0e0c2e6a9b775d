//! Header section processing.
//!
//! - [`FieldLineDecoder`]: splits a header or trailer section into validated
//!   fields, merging obsolete line folds
//! - [`HeaderEncoder`]: writes a message head

mod header_decoder;
mod header_encoder;

pub(crate) use header_decoder::FieldLine;
pub(crate) use header_decoder::FieldLineDecoder;
pub use header_encoder::HeaderEncoder;

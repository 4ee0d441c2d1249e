//! Body decoders for incoming messages.
//!
//! # Components
//!
//! - [`ChunkedBodyDecoder`]: decodes the chunked transfer coding under a size limit
//! - [`BoundedBodyDecoder`]: collects a body of declared length, or a body that runs until the
//!   connection closes
//!
//! Both decoders are incremental: they keep their position between calls and accept input
//! split at any byte.

mod bounded_decoder;
mod chunked_decoder;

pub use bounded_decoder::BodyLength;
pub use bounded_decoder::BoundedBodyDecoder;
pub use chunked_decoder::ChunkedBodyDecoder;

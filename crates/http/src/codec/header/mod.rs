//! Header block processing.
//!
//! - [`HeaderBlockParser`]: incrementally parses the start line and header fields
//! - [`HeadEncoder`]: renders a start line and header fields back to bytes

mod header_encoder;
mod header_parser;

pub use header_encoder::HeadEncoder;
pub use header_parser::HeaderBlockParser;

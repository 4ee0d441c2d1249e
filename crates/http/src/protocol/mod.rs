//! Core HTTP/1.x protocol types.
//!
//! This module holds the data model shared by the parsers, the serializer and the connection
//! layer. Nothing here performs I/O.
//!
//! # Components
//!
//! - **Headers** ([`HeaderMultimap`]): ordered, case-insensitive header storage with
//!   comma-joining normalization
//! - **Start lines** ([`RequestLine`], [`StatusLine`], [`StartLine`], [`Version`]): parse from and
//!   render to the first line of a message
//! - **Messages** ([`ParsedMessage`], [`MessageState`], [`PayloadSize`]): the result handed over
//!   by the parser and the framing decision used when sending
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`], [`ReadError`])
//! - **Names** ([`names`]): the header names and methods the engine interprets itself

mod message;
pub use message::MessageState;
pub use message::ParsedMessage;
pub use message::PayloadSize;

mod header_map;
pub use header_map::HeaderMultimap;

mod start_line;
pub use start_line::RequestLine;
pub use start_line::StartLine;
pub use start_line::StatusLine;
pub use start_line::Version;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::ReadError;
pub use error::SendError;

pub mod names;

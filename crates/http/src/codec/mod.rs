//! Parsing and serializing of HTTP/1.x messages.
//!
//! Nothing in this module performs I/O: parsers are fed byte slices and report how much they
//! consumed, serializers emit byte spans for the connection layer to write.
//!
//! # Architecture
//!
//! - Parsing:
//!   - [`MessageParser`]: drives a message from the first byte to the end of its body
//!   - Header block parsing via the [`header`] module
//!   - Body decoding via the [`body`] module
//!   - [`MessageCodec`]: a `tokio_util` decoder over [`MessageParser`]
//!
//! - Serializing:
//!   - [`MessageSerializer`]: start line, headers and body as zero-copy spans
//!
//! # Example
//!
//! ```
//! use reactor_http::codec::MessageParser;
//!
//! let mut parser = MessageParser::request(1024);
//! let input = b"GET /a/b HTTP/1.1\r\nHost: x\r\n\r\n";
//!
//! let consumed = parser.parse(input).unwrap();
//! assert_eq!(consumed, input.len());
//! assert!(parser.is_finished());
//!
//! let message = parser.into_message();
//! assert_eq!(message.path(), Some("/a/b"));
//! ```

pub mod body;
pub mod header;

mod message_codec;
mod message_parser;
mod message_serializer;

pub use message_codec::MessageCodec;
pub use message_parser::MessageParser;
pub use message_parser::ParserState;
pub use message_serializer::MessageSerializer;
pub use message_serializer::ResetMode;

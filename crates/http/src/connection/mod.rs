//! Connection handling: one byte stream, the reader of incoming messages and the writer of
//! outgoing ones.
//!
//! # Components
//!
//! - [`Connection`]: owns the stream, a fixed read buffer, the pipeline bookmark and the
//!   [`Lifecycle`] decided after each message
//! - [`MessageReader`]: reads one message with a per-read timeout and sets the lifecycle
//! - [`MessageWriter`]: writes one message, whole or chunk by chunk
//!
//! A connection is used by one reader and one writer at a time; both borrow it mutably for the
//! duration of their operation.

mod http_connection;
mod message_reader;
mod message_writer;

pub use http_connection::Connection;
pub use http_connection::Lifecycle;
pub use http_connection::READ_BUFFER_SIZE;
pub use message_reader::DEFAULT_MAX_BODY_SIZE;
pub use message_reader::DEFAULT_READ_TIMEOUT;
pub use message_reader::MessageReader;
pub use message_reader::ReaderConfig;
pub use message_writer::MessageWriter;

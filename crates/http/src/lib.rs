//! The HTTP/1.x protocol engine of reactor-http
//!
//! This crate parses HTTP/1.0 and HTTP/1.1 messages incrementally from arbitrarily split byte
//! streams, serializes outgoing messages as zero-copy byte spans, and drives both directions
//! over an asynchronous byte stream with keep-alive, pipelining and read timeouts.
//!
//! # Features
//!
//! - Byte-at-a-time header parsing, tolerant of any split between reads
//! - Chunked transfer coding and `Content-Length` bodies, with a body size limit
//! - Bodies terminated by connection close for responses without framing
//! - Keep-alive negotiation for HTTP/1.0 and HTTP/1.1
//! - Pipelined requests served from the read buffer without extra socket reads
//! - Chunked streaming of outgoing bodies
//!
//! # Example
//!
//! ```no_run
//! use reactor_http::codec::MessageSerializer;
//! use reactor_http::connection::{Connection, MessageReader, MessageWriter, ReaderConfig};
//! use reactor_http::protocol::StatusLine;
//! use tokio::net::TcpListener;
//! use tracing::{info, warn};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let config = ReaderConfig::default();
//!
//!     loop {
//!         let (stream, _remote_addr) = listener.accept().await?;
//!
//!         tokio::spawn(async move {
//!             let mut conn = Connection::new(stream);
//!             while conn.is_keep_alive() {
//!                 let message = match MessageReader::request(&config).receive(&mut conn).await {
//!                     Ok(message) => message,
//!                     Err(e) => {
//!                         info!(cause = %e, "connection ended");
//!                         return;
//!                     }
//!                 };
//!
//!                 let code = if message.is_finished() { 200 } else { 400 };
//!                 let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(message.version(), code)));
//!                 writer.serializer_mut().append_static(b"Hello World!\r\n");
//!                 if let Err(e) = writer.send(&mut conn).await {
//!                     warn!(cause = %e, "failed to send response");
//!                     return;
//!                 }
//!             }
//!             let _ = conn.close().await;
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: message types, start lines, headers and the error taxonomy
//! - [`codec`]: incremental parsers and the span serializer, free of I/O
//! - [`connection`]: the stream owner with its reader and writer
//! - [`handler`]: the trait answering parsed messages
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Why a message failed to parse
//! - [`protocol::SendError`]: Why a message could not be sent
//! - [`protocol::ReadError`]: Why a connection ended while reading
//!
//! A parse failure does not surface as an error of the reader: the failed message is returned
//! so the caller can still answer it, and the connection is marked for closing.
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64
//! - No trailer fields or chunk extensions

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;

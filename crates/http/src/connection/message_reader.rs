use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::MessageParser;
use crate::connection::{Connection, Lifecycle};
use crate::protocol::{ParsedMessage, ReadError};

/// Default limit for the body of one message, 1 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default time to wait for each read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings shared by every reader of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub max_body_size: usize,
    /// `None` waits forever
    pub read_timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { max_body_size: DEFAULT_MAX_BODY_SIZE, read_timeout: Some(DEFAULT_READ_TIMEOUT) }
    }
}

/// Reads one message from a [`Connection`].
///
/// A reader is used for exactly one message: [`receive`](MessageReader::receive) consumes it.
/// Bytes of a following message that arrived in the same read are left in the connection as a
/// pipeline bookmark, and the next reader starts from them without touching the socket.
#[derive(Debug)]
pub struct MessageReader {
    parser: MessageParser,
    read_timeout: Option<Duration>,
}

impl MessageReader {
    pub fn request(config: &ReaderConfig) -> Self {
        Self { parser: MessageParser::request(config.max_body_size), read_timeout: config.read_timeout }
    }

    /// A reader for the response to a request made with `requested_method`.
    pub fn response(config: &ReaderConfig, requested_method: &str) -> Self {
        Self { parser: MessageParser::response(config.max_body_size, requested_method), read_timeout: config.read_timeout }
    }

    /// Reads until the message is complete or broken.
    ///
    /// On success the connection lifecycle is updated: `KeepAlive` or `Pipelined` when the
    /// message allows reuse, `Close` otherwise. A message that failed to parse is still
    /// returned, with the lifecycle set to `Close`, so the caller can answer it.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` when the stream ends, fails or times out before the message is
    /// complete. The connection is closed in that case.
    pub async fn receive<S>(mut self, conn: &mut Connection<S>) -> Result<ParsedMessage, ReadError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut received = 0;

        loop {
            let range = match conn.take_pipeline_position() {
                Some(range) => range,
                None => match self.read(conn).await {
                    Ok(0) => return self.end_of_stream(conn, received, None).await,
                    Ok(n) => 0..n,
                    Err(e) => return self.end_of_stream(conn, received, Some(e)).await,
                },
            };
            received += range.len();

            match self.parser.parse(conn.buffer(range.clone())) {
                Ok(consumed) if self.parser.is_finished() => {
                    let rest = range.start + consumed..range.end;
                    if !self.parser.check_keep_alive() {
                        conn.set_lifecycle(Lifecycle::Close);
                    } else if rest.is_empty() {
                        conn.set_lifecycle(Lifecycle::KeepAlive);
                    } else {
                        conn.save_pipeline_position(rest);
                        conn.set_lifecycle(Lifecycle::Pipelined);
                    }
                    return Ok(self.parser.into_message());
                }

                Ok(_) => {}

                Err(e) => {
                    warn!(cause = %e, "failed to parse message, connection will be closed");
                    conn.set_lifecycle(Lifecycle::Close);
                    return Ok(self.parser.into_message());
                }
            }
        }
    }

    async fn read<S>(&self, conn: &mut Connection<S>) -> Result<usize, ReadError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.read_timeout {
            Some(duration) => match timeout(duration, conn.read_some()).await {
                Ok(result) => result.map_err(ReadError::io),
                Err(_elapsed) => Err(ReadError::Timeout(duration)),
            },
            None => conn.read_some().await.map_err(ReadError::io),
        }
    }

    /// Handles the stream ending, failing or timing out before the message finished.
    async fn end_of_stream<S>(
        mut self,
        conn: &mut Connection<S>,
        received: usize,
        error: Option<ReadError>,
    ) -> Result<ParsedMessage, ReadError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.parser.is_unacceptable_eof() {
            self.parser.set_finished();
            conn.set_lifecycle(Lifecycle::Close);
            if error.is_some() {
                Self::shutdown(conn).await;
            }
            return Ok(self.parser.into_message());
        }

        Self::shutdown(conn).await;

        let error = match error {
            Some(error) => error,
            None if received == 0 => ReadError::Closed,
            None => ReadError::UnexpectedEof,
        };

        if received == 0 {
            debug!(cause = %error, "idle connection ended");
        } else {
            warn!(cause = %error, received, "connection ended in the middle of a message");
        }
        Err(error)
    }

    async fn shutdown<S>(conn: &mut Connection<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = conn.close().await {
            debug!(cause = %e, "failed to shut down connection");
        }
    }
}

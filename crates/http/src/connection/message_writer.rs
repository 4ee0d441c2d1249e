use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::error;

use crate::codec::{MessageSerializer, ResetMode};
use crate::connection::{Connection, Lifecycle};
use crate::protocol::{PayloadSize, SendError};

/// Writes one message, whole or as a stream of chunks, to a [`Connection`].
///
/// The head is sent with the first write. Its framing headers are computed at that moment from
/// the connection lifecycle and from the body appended so far, so callers may fill the body
/// after creating the writer.
#[derive(Debug)]
pub struct MessageWriter {
    serializer: MessageSerializer,
    head_sent: bool,
    finished: bool,
}

impl MessageWriter {
    pub fn new(serializer: MessageSerializer) -> Self {
        Self { serializer, head_sent: false, finished: false }
    }

    #[inline]
    pub fn serializer(&self) -> &MessageSerializer {
        &self.serializer
    }

    /// Access to the message, to append body data between chunks.
    #[inline]
    pub fn serializer_mut(&mut self) -> &mut MessageSerializer {
        &mut self.serializer
    }

    /// Returns true once the whole message went out.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Sends the head and the whole body, framed by `Content-Length`.
    ///
    /// # Errors
    ///
    /// Fails if the message was already (partly) sent, has no start line, or the write fails.
    pub async fn send<S>(&mut self, conn: &mut Connection<S>) -> Result<usize, SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.head_sent {
            return Err(SendError::invalid_body("message head was already sent"));
        }

        let payload = self.serializer.payload_size();
        self.serializer.finalize_headers(conn.is_keep_alive(), payload);

        let mut spans = Vec::with_capacity(4);
        self.serializer.head(&mut spans)?;
        self.serializer.body(&mut spans);

        let written = self.write(conn, &spans).await?;
        self.head_sent = true;
        self.finished = true;
        Ok(written)
    }

    /// Sends the current body as one chunk, preceded by the head on the first call.
    ///
    /// With `last` the terminal chunk follows and the message is complete. The body spans are
    /// cleared afterwards so the next chunk can be appended.
    ///
    /// # Errors
    ///
    /// Fails if the message version cannot carry chunks, the message is already complete, or
    /// the write fails.
    pub async fn send_chunk<S>(&mut self, conn: &mut Connection<S>, last: bool) -> Result<usize, SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.finished {
            return Err(SendError::invalid_body("message was already sent completely"));
        }
        if !self.serializer.does_support_chunks() {
            return Err(SendError::invalid_body("chunked transfer coding needs HTTP/1.1"));
        }

        let mut spans = Vec::with_capacity(6);
        if !self.head_sent {
            self.serializer.finalize_headers(conn.is_keep_alive(), PayloadSize::Chunked);
            self.serializer.head(&mut spans)?;
        }
        self.serializer.chunk(&mut spans);
        if last {
            self.serializer.final_chunk(&mut spans);
        }

        let written = self.write(conn, &spans).await?;
        self.head_sent = true;
        self.finished = last;
        self.serializer.reset(ResetMode::Body);
        Ok(written)
    }

    /// Ends a chunked message with the terminal chunk.
    ///
    /// # Errors
    ///
    /// See [`send_chunk`](MessageWriter::send_chunk).
    pub async fn send_final_chunk<S>(&mut self, conn: &mut Connection<S>) -> Result<usize, SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.serializer.reset(ResetMode::Body);
        self.send_chunk(conn, true).await
    }

    async fn write<S>(&mut self, conn: &mut Connection<S>, spans: &[Bytes]) -> Result<usize, SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        conn.set_sending(true);
        let result = conn.write_all(spans).await;
        conn.set_sending(false);

        result.map_err(|e| {
            error!(cause = %e, "failed to write message");
            if !self.serializer.is_request() {
                conn.set_lifecycle(Lifecycle::Close);
            }
            SendError::io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;
    use crate::codec::MessageParser;
    use crate::protocol::{StatusLine, Version};

    async fn read_all(mut client: tokio::io::DuplexStream) -> Vec<u8> {
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn send_whole_message() {
        let (client, server) = duplex(1024);
        let mut conn = Connection::new(server);

        let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200)));
        writer.serializer_mut().append_static(b"hello");
        writer.send(&mut conn).await.unwrap();
        assert!(writer.is_finished());
        assert!(!conn.is_sending());
        assert!(writer.send(&mut conn).await.is_err());
        drop(conn);

        let received = read_all(client).await;
        assert_eq!(received, b"HTTP/1.1 200 OK\r\nConnection: Keep-Alive\r\nContent-Length: 5\r\n\r\nhello");
    }

    #[tokio::test]
    async fn send_chunks() {
        let (client, server) = duplex(1024);
        let mut conn = Connection::new(server);
        conn.set_lifecycle(Lifecycle::Close);

        let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200)));
        for piece in ["first ", "second ", "third"] {
            writer.serializer_mut().append(Bytes::from(piece));
            writer.send_chunk(&mut conn, false).await.unwrap();
        }
        writer.send_final_chunk(&mut conn).await.unwrap();
        assert!(writer.is_finished());
        drop(conn);

        let received = read_all(client).await;
        let mut parser = MessageParser::response(1024, "GET");
        assert_eq!(parser.parse(&received).unwrap(), received.len());

        let message = parser.into_message();
        assert!(message.is_finished());
        assert_eq!(message.header("connection"), Some("close"));
        assert_eq!(message.header("transfer-encoding"), Some("chunked"));
        assert_eq!(message.body(), &b"first second third"[..]);
    }

    #[tokio::test]
    async fn http10_cannot_chunk() {
        let (_client, server) = duplex(1024);
        let mut conn = Connection::new(server);

        let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(Version::HTTP_10, 200)));
        assert!(matches!(writer.send_chunk(&mut conn, true).await, Err(SendError::InvalidBody { .. })));
    }

    #[tokio::test]
    async fn write_error_closes_response() {
        let (client, server) = duplex(1024);
        let mut conn = Connection::new(server);
        drop(client);

        let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200)));
        assert!(matches!(writer.send(&mut conn).await, Err(SendError::Io { .. })));
        assert_eq!(conn.lifecycle(), Lifecycle::Close);
        assert!(!conn.is_sending());
    }
}

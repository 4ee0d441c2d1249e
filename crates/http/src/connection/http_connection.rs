use std::io;
use std::io::IoSlice;
use std::ops::Range;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the fixed read buffer every connection owns
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// What happens to a connection once the current message is done.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Close the connection
    Close,
    /// Wait for the next message on the socket
    KeepAlive,
    /// The next message already started in the read buffer
    Pipelined,
}

/// One byte stream with its read buffer and lifecycle state.
///
/// The read buffer has a fixed size and never moves, so the bytes of a pipelined message stay
/// valid in place until the next reader picks them up through
/// [`take_pipeline_position`](Connection::take_pipeline_position).
///
/// Reads and writes both need `&mut self`, which keeps at most one operation of each kind in
/// flight.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buffer: Box<[u8; READ_BUFFER_SIZE]>,
    pipeline: Option<Range<usize>>,
    lifecycle: Lifecycle,
    sending: bool,
    open: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Box::new([0; READ_BUFFER_SIZE]),
            pipeline: None,
            lifecycle: Lifecycle::KeepAlive,
            sending: false,
            open: true,
        }
    }

    /// Reads from the stream into the start of the read buffer.
    ///
    /// Returns the number of bytes read; 0 means the peer closed its side. The bytes are found
    /// at `buffer(0..n)`.
    pub async fn read_some(&mut self) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        debug_assert!(self.pipeline.is_none(), "pipelined bytes would be overwritten");
        self.stream.read(&mut self.buffer[..]).await
    }

    /// A window into the read buffer.
    pub fn buffer(&self, range: Range<usize>) -> &[u8] {
        &self.buffer[range]
    }

    /// Writes every span and flushes, returning the number of bytes written.
    pub async fn write_all(&mut self, spans: &[Bytes]) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }

        let mut slices: Vec<IoSlice<'_>> = spans.iter().filter(|span| !span.is_empty()).map(|span| IoSlice::new(span)).collect();
        let mut remaining = &mut slices[..];
        let mut written = 0;

        while !remaining.is_empty() {
            let n = self.stream.write_vectored(remaining).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            written += n;
            IoSlice::advance_slices(&mut remaining, n);
        }

        self.stream.flush().await?;
        trace!(written, "wrote message spans");
        Ok(written)
    }

    /// Remembers that `range` of the read buffer holds the start of the next message.
    pub fn save_pipeline_position(&mut self, range: Range<usize>) {
        debug_assert!(range.end <= READ_BUFFER_SIZE);
        self.pipeline = Some(range);
    }

    pub fn take_pipeline_position(&mut self) -> Option<Range<usize>> {
        self.pipeline.take()
    }

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
        if lifecycle != Lifecycle::Pipelined {
            self.pipeline = None;
        }
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::KeepAlive | Lifecycle::Pipelined)
    }

    #[inline]
    pub fn is_pipelined(&self) -> bool {
        self.lifecycle == Lifecycle::Pipelined
    }

    #[inline]
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub(crate) fn set_sending(&mut self, sending: bool) {
        self.sending = sending;
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Shuts the stream down. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Fails without closing while a write is in flight, or when the shutdown itself fails.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.sending {
            return Err(io::Error::other("connection is sending"));
        }
        if !self.open {
            return Ok(());
        }

        self.open = false;
        self.lifecycle = Lifecycle::Close;
        self.pipeline = None;
        self.stream.shutdown().await
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn read_and_write() {
        let (client, server) = duplex(64);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        let spans = [Bytes::from_static(b"hello"), Bytes::new(), Bytes::from_static(b" world")];
        assert_eq!(client.write_all(&spans).await.unwrap(), 11);

        let mut received = Vec::new();
        while received.len() < 11 {
            let n = server.read_some().await.unwrap();
            received.extend_from_slice(server.buffer(0..n));
        }
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn close_is_refused_while_sending() {
        let (client, _server) = duplex(64);
        let mut connection = Connection::new(client);

        connection.set_sending(true);
        assert!(connection.close().await.is_err());
        assert!(connection.is_open());

        connection.set_sending(false);
        connection.close().await.unwrap();
        connection.close().await.unwrap();
        assert!(!connection.is_open());
        assert_eq!(connection.lifecycle(), Lifecycle::Close);
        assert!(connection.read_some().await.is_err());
    }

    #[tokio::test]
    async fn pipeline_bookmark() {
        let (client, _server) = duplex(64);
        let mut connection = Connection::new(client);

        connection.save_pipeline_position(3..10);
        connection.set_lifecycle(Lifecycle::Pipelined);
        assert!(connection.is_keep_alive());
        assert_eq!(connection.take_pipeline_position(), Some(3..10));
        assert_eq!(connection.take_pipeline_position(), None);

        connection.save_pipeline_position(0..1);
        connection.set_lifecycle(Lifecycle::Close);
        assert_eq!(connection.take_pipeline_position(), None);
    }
}

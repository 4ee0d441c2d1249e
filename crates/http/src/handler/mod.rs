//! The boundary between the connection layer and the code answering messages.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::protocol::ParsedMessage;

/// Receives every message a [`MessageReader`](crate::connection::MessageReader) produced.
///
/// The handler is called once per message, finished or failed, and is expected to write the
/// answer to `conn` with a [`MessageWriter`](crate::connection::MessageWriter). The connection
/// lifecycle the reader computed tells it whether the connection stays open.
#[trait_variant::make(MessageHandler: Send)]
pub trait LocalMessageHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn on_message_complete(&self, message: ParsedMessage, conn: &mut Connection<S>);
}

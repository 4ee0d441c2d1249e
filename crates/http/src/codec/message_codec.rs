//! A [`Decoder`] over [`MessageParser`] for use with `tokio_util::codec::FramedRead`.
//!
//! Clients and tests that read a stream of responses (or requests) from a socket can wrap it
//! in a `FramedRead` with this codec instead of driving a [`Connection`](crate::connection::Connection).

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::MessageParser;
use crate::protocol::{HttpError, ParsedMessage, ReadError};

#[derive(Debug, Clone)]
enum Kind {
    Request,
    Response { requested_method: String },
}

/// Decodes one message after another from a byte stream.
#[derive(Debug)]
pub struct MessageCodec {
    kind: Kind,
    max_body_size: usize,
    parser: Option<MessageParser>,
}

impl MessageCodec {
    pub fn request(max_body_size: usize) -> Self {
        Self { kind: Kind::Request, max_body_size, parser: None }
    }

    /// Decodes responses to requests made with `requested_method`.
    pub fn response<M: Into<String>>(max_body_size: usize, requested_method: M) -> Self {
        Self { kind: Kind::Response { requested_method: requested_method.into() }, max_body_size, parser: None }
    }

    fn new_parser(&self) -> MessageParser {
        match &self.kind {
            Kind::Request => MessageParser::request(self.max_body_size),
            Kind::Response { requested_method } => MessageParser::response(self.max_body_size, requested_method),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = ParsedMessage;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.parser.is_none() {
            if src.is_empty() {
                return Ok(None);
            }
            self.parser = Some(self.new_parser());
        }

        let Some(parser) = self.parser.as_mut() else {
            return Ok(None);
        };

        let consumed = parser.parse(&src[..])?;
        src.advance(consumed);

        if parser.is_finished() { Ok(self.parser.take().map(MessageParser::into_message)) } else { Ok(None) }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        match self.parser.take() {
            None => Ok(None),
            Some(mut parser) if !parser.is_unacceptable_eof() => {
                parser.set_finished();
                Ok(Some(parser.into_message()))
            }
            Some(_) => Err(ReadError::UnexpectedEof.into()),
        }
    }
}

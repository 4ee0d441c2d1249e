//! Top level parser turning a byte stream into one [`ParsedMessage`].
//!
//! The parser runs the header block through [`HeaderBlockParser`], then picks the body framing
//! from the headers and hands the remaining bytes to a [`ChunkedBodyDecoder`] or a
//! [`BoundedBodyDecoder`]:
//!
//! ```text
//! WantHeaders --+--> WantChunkedBody --+--> Finished
//!               +--> WantBoundedBody --+
//!               +--> Finished
//! ```
//!
//! `Failed` is reachable from every state that is not terminal. The state never goes back.
//!
//! # Results
//!
//! [`MessageParser::parse`] returns `Ok(n)` when it consumed `n` bytes without error. If
//! [`is_finished`](MessageParser::is_finished) is then true the message is complete and the
//! bytes after `n` belong to the next message; otherwise more input is needed. `Err` means the
//! message is broken and the connection must not be reused.

use bytes::Bytes;
use tracing::{trace, warn};

use crate::codec::body::{BodyLength, BoundedBodyDecoder, ChunkedBodyDecoder};
use crate::codec::header::HeaderBlockParser;
use crate::protocol::names::METHOD_HEAD;
use crate::protocol::{ParseError, ParsedMessage, RequestLine, StartLine, StatusLine};

/// Where the parser stands in the current message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParserState {
    WantHeaders,
    WantChunkedBody,
    WantBoundedBody,
    Failed,
    Finished,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MessageKind {
    Request,
    /// `head` is true when the response answers a `HEAD` request
    Response { head: bool },
}

/// Incremental parser for a single request or response.
#[derive(Debug)]
pub struct MessageParser {
    kind: MessageKind,
    state: ParserState,
    header: HeaderBlockParser,
    chunked: ChunkedBodyDecoder,
    bounded: BoundedBodyDecoder,
    error: Option<ParseError>,
}

impl MessageParser {
    /// A parser for a request whose body may hold at most `max_body_size` bytes.
    pub fn request(max_body_size: usize) -> Self {
        Self::new(MessageKind::Request, max_body_size)
    }

    /// A parser for the response to a request made with `requested_method`.
    pub fn response(max_body_size: usize, requested_method: &str) -> Self {
        let head = requested_method.eq_ignore_ascii_case(METHOD_HEAD);
        Self::new(MessageKind::Response { head }, max_body_size)
    }

    fn new(kind: MessageKind, max_body_size: usize) -> Self {
        Self {
            kind,
            state: ParserState::WantHeaders,
            header: HeaderBlockParser::new(),
            chunked: ChunkedBodyDecoder::new(max_body_size),
            bounded: BoundedBodyDecoder::new(max_body_size),
            error: None,
        }
    }

    /// Feeds `bytes` to the parser and returns how many of them belong to this message.
    ///
    /// All of `bytes` is offered to the active stage, and whatever the header block leaves is
    /// offered to the body stage in the same call, so a complete message in one slice finishes
    /// in one call. Bytes past the end of the message are never consumed.
    ///
    /// # Errors
    ///
    /// Returns the `ParseError` that moved the parser to [`ParserState::Failed`]. Once failed,
    /// every call returns the same error.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<usize, ParseError> {
        let mut consumed = 0;

        loop {
            let rest = &bytes[consumed..];

            match self.state {
                ParserState::WantHeaders => {
                    consumed += self.header.parse(rest).map_err(|e| self.fail(e))?;
                    if !self.header.is_finished() {
                        return Ok(consumed);
                    }
                    self.state = self.select_body().map_err(|e| self.fail(e))?;
                    trace!(state = ?self.state, header_size = consumed, "header block finished");
                }

                ParserState::WantChunkedBody => {
                    consumed += self.chunked.parse(rest).map_err(|e| self.fail(e))?;
                    if self.chunked.is_finished() {
                        self.state = ParserState::Finished;
                    }
                    return Ok(consumed);
                }

                ParserState::WantBoundedBody => {
                    let n = self.bounded.parse(rest);
                    consumed += n;
                    if self.bounded.is_finished() {
                        self.state = ParserState::Finished;
                    } else if n < rest.len() {
                        return Err(self.fail(ParseError::body_too_large(self.bounded.max_body_size())));
                    }
                    return Ok(consumed);
                }

                ParserState::Finished => return Ok(consumed),

                ParserState::Failed => return Err(self.error.clone().unwrap_or(ParseError::IncompleteMessage)),
            }
        }
    }

    /// Validates the start line and decides how the body is framed.
    fn select_body(&mut self) -> Result<ParserState, ParseError> {
        let bodiless = match self.kind {
            MessageKind::Request => {
                self.header.request_line()?;
                false
            }
            MessageKind::Response { head } => head || self.header.status_line()?.is_bodiless(),
        };

        if self.header.is_chunked() {
            return Ok(ParserState::WantChunkedBody);
        }

        if bodiless {
            return Ok(ParserState::Finished);
        }

        let length = match (self.header.content_length(), self.kind) {
            (Some(length), _) => BodyLength::Exactly(length),
            // a request without framing has no body
            (None, MessageKind::Request) => return Ok(ParserState::Finished),
            (None, MessageKind::Response { .. }) => BodyLength::UntilClose,
        };

        self.bounded.reset(length);
        if self.bounded.is_finished() { Ok(ParserState::Finished) } else { Ok(ParserState::WantBoundedBody) }
    }

    fn fail(&mut self, error: ParseError) -> ParseError {
        self.state = ParserState::Failed;
        self.error = Some(error.clone());
        error
    }

    #[inline]
    pub fn state(&self) -> ParserState {
        self.state
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == ParserState::Finished
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.state == ParserState::Failed
    }

    /// Returns true if the end of the stream would cut this message short.
    ///
    /// Only a response body that runs until the connection closes may legitimately end with
    /// the stream.
    pub fn is_unacceptable_eof(&self) -> bool {
        !(self.state == ParserState::WantBoundedBody && self.bounded.is_until_close())
    }

    /// Ends the message at the current position because the stream ended.
    ///
    /// A body that was still being read becomes complete; a message stopped anywhere else
    /// fails as incomplete.
    pub fn set_finished(&mut self) {
        match self.state {
            ParserState::WantBoundedBody => {
                if let Some(remaining) = self.bounded.remaining().filter(|&remaining| remaining > 0) {
                    warn!(remaining, "stream ended before the declared body length");
                }
                self.bounded.set_finished();
                self.state = ParserState::Finished;
            }
            ParserState::WantHeaders | ParserState::WantChunkedBody => {
                self.fail(ParseError::IncompleteMessage);
            }
            ParserState::Finished | ParserState::Failed => {}
        }
    }

    /// Whether the connection may carry another message after this one.
    ///
    /// Only a finished message may keep the connection, and a response whose body ran until
    /// close never does.
    pub fn check_keep_alive(&self) -> bool {
        match self.kind {
            _ if !self.is_finished() => false,
            MessageKind::Request => self.header.keep_alive(true),
            MessageKind::Response { .. } => !self.bounded.is_until_close() && self.header.keep_alive(false),
        }
    }

    /// The header block parsed so far.
    pub fn header_block(&self) -> &HeaderBlockParser {
        &self.header
    }

    /// Turns the parser into the parsed message, finished or failed.
    pub fn into_message(mut self) -> ParsedMessage {
        let keep_alive = self.check_keep_alive();

        let start = match self.kind {
            MessageKind::Request => self.header.request_line().ok().cloned().map(StartLine::from),
            MessageKind::Response { .. } => self.header.status_line().ok().cloned().map(StartLine::from),
        };
        let body = self.take_body();
        let headers = self.header.take_headers();

        match (self.state, start) {
            (ParserState::Finished, Some(start)) => ParsedMessage::finished(start, headers, body, keep_alive),
            (_, start) => {
                let error = self.error.take().unwrap_or(ParseError::IncompleteMessage);
                ParsedMessage::failed(start, headers, body, error)
            }
        }
    }

    fn take_body(&mut self) -> Bytes {
        if self.header.is_finished() && self.header.is_chunked() {
            self.chunked.take_body()
        } else {
            self.bounded.take_body()
        }
    }

    /// The request line, once the header block is complete and the line is valid.
    pub fn request_line(&self) -> Option<&RequestLine> {
        match self.kind {
            MessageKind::Request if self.header.is_finished() => self.header.request_line().ok(),
            _ => None,
        }
    }

    /// The status line, once the header block is complete and the line is valid.
    pub fn status_line(&self) -> Option<&StatusLine> {
        match self.kind {
            MessageKind::Response { .. } if self.header.is_finished() => self.header.status_line().ok(),
            _ => None,
        }
    }
}

use bytes::Bytes;

use crate::protocol::{HeaderMultimap, ParseError, RequestLine, StartLine, StatusLine, Version};

/// Terminal state of a parsed message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageState {
    /// The header block and the whole body were consumed
    Finished,
    /// The message violated the protocol or a resource limit
    Failed,
}

/// A complete (or failed) message handed over by the parser.
///
/// A failed message keeps whatever was parsed before the failure, so the start line may be
/// missing and the headers and body may be partial. Callers must check [`is_finished`] before
/// trusting the content.
///
/// [`is_finished`]: ParsedMessage::is_finished
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    start: Option<StartLine>,
    headers: HeaderMultimap,
    body: Bytes,
    state: MessageState,
    error: Option<ParseError>,
    keep_alive: bool,
    username: Option<String>,
}

impl ParsedMessage {
    pub fn finished(start: StartLine, headers: HeaderMultimap, body: Bytes, keep_alive: bool) -> Self {
        Self { start: Some(start), headers, body, state: MessageState::Finished, error: None, keep_alive, username: None }
    }

    pub fn failed(start: Option<StartLine>, headers: HeaderMultimap, body: Bytes, error: ParseError) -> Self {
        Self { start, headers, body, state: MessageState::Failed, error: Some(error), keep_alive: false, username: None }
    }

    #[inline]
    pub fn state(&self) -> MessageState {
        self.state
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == MessageState::Finished
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.state == MessageState::Failed
    }

    /// The reason the parse failed, if it did.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    pub fn start_line(&self) -> Option<&StartLine> {
        self.start.as_ref()
    }

    pub fn request_line(&self) -> Option<&RequestLine> {
        match &self.start {
            Some(StartLine::Request(line)) => Some(line),
            _ => None,
        }
    }

    pub fn status_line(&self) -> Option<&StatusLine> {
        match &self.start {
            Some(StartLine::Status(line)) => Some(line),
            _ => None,
        }
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.request_line().is_some()
    }

    pub fn method(&self) -> Option<&str> {
        self.request_line().map(|line| line.method.as_str())
    }

    pub fn path(&self) -> Option<&str> {
        self.request_line().map(|line| line.path.as_str())
    }

    pub fn query(&self) -> Option<&str> {
        self.request_line().map(|line| line.query.as_str())
    }

    pub fn status_code(&self) -> Option<u32> {
        self.status_line().map(|line| line.code)
    }

    /// The message version, or HTTP/1.1 when the start line never parsed.
    pub fn version(&self) -> Version {
        self.start.as_ref().map(StartLine::version).unwrap_or_default()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the peer asked for the connection to stay open after this message.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The user name established by authentication, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username<S: Into<String>>(&mut self, username: S) {
        self.username = Some(username.into());
    }
}

/// Represents the size information of an outgoing HTTP payload.
///
/// This enum is used to determine how the payload should be framed:
/// - Known length: framed by `Content-Length`
/// - Chunked: framed using chunked transfer encoding
/// - Empty: no payload bytes at all
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_message_keeps_partial_content() {
        let headers: HeaderMultimap = [("Host", "x")].into_iter().collect();
        let message = ParsedMessage::failed(None, headers, Bytes::from_static(b"par"), ParseError::IncompleteMessage);

        assert!(message.is_failed());
        assert!(!message.is_finished());
        assert!(!message.keep_alive());
        assert_eq!(message.method(), None);
        assert_eq!(message.version(), Version::HTTP_11);
        assert_eq!(message.header("host"), Some("x"));
        assert_eq!(message.error(), Some(&ParseError::IncompleteMessage));
    }

    #[test]
    fn username_slot() {
        let line: RequestLine = "PUT /doc HTTP/1.0".parse().unwrap();
        let mut message = ParsedMessage::finished(line.into(), HeaderMultimap::new(), Bytes::new(), false);

        assert_eq!(message.username(), None);
        message.set_username("alice");
        assert_eq!(message.username(), Some("alice"));
        assert_eq!(message.method(), Some("PUT"));
        assert_eq!(message.version(), Version::HTTP_10);
    }
}

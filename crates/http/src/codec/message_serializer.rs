//! Builds outgoing messages as a list of byte spans.
//!
//! The serializer keeps a start line, the header fields and the body spans of one message.
//! Body data is stored as [`Bytes`] handles and is never copied: only the head (start line and
//! headers) is rendered into a fresh buffer. Emitters append the spans for one write to a
//! caller-provided `Vec<Bytes>`:
//!
//! - [`head`](MessageSerializer::head): start line, headers and blank line
//! - [`body`](MessageSerializer::body): the body spans as they are
//! - [`chunk`](MessageSerializer::chunk): the body spans framed as one chunk
//! - [`final_chunk`](MessageSerializer::final_chunk): the terminal zero-length chunk
//!
//! Framing headers are not computed on construction: the writer calls
//! [`finalize_headers`](MessageSerializer::finalize_headers) right before the first write.

use bytes::Bytes;

use crate::codec::header::HeadEncoder;
use crate::protocol::names::{CHUNKED, CLOSE, CONNECTION, CONTENT_LENGTH, KEEP_ALIVE, TRANSFER_ENCODING};
use crate::protocol::{HeaderMultimap, PayloadSize, RequestLine, SendError, StartLine, StatusLine};

const CRLF: &[u8] = b"\r\n";
const FINAL_CHUNK: &[u8] = b"0\r\n\r\n";

/// What [`MessageSerializer::reset`] clears.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetMode {
    /// Only the body spans, for the next chunk of the same message
    Body,
    /// Start line, headers and body
    All,
}

#[derive(Debug, Clone, Default)]
pub struct MessageSerializer {
    start: Option<StartLine>,
    headers: HeaderMultimap,
    body: Vec<Bytes>,
}

impl MessageSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response(status: StatusLine) -> Self {
        Self { start: Some(status.into()), ..Self::default() }
    }

    pub fn request(request: RequestLine) -> Self {
        Self { start: Some(request.into()), ..Self::default() }
    }

    pub fn set_start_line<L: Into<StartLine>>(&mut self, start: L) {
        self.start = Some(start.into());
    }

    pub fn start_line(&self) -> Option<&StartLine> {
        self.start.as_ref()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMultimap {
        &mut self.headers
    }

    pub fn set_header<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.headers.set(name, value);
    }

    /// Appends a body span without copying it.
    pub fn append(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.body.push(data);
        }
    }

    pub fn append_static(&mut self, data: &'static [u8]) {
        self.append(Bytes::from_static(data));
    }

    /// Total size of the current body spans.
    pub fn content_length(&self) -> u64 {
        self.body.iter().map(|span| span.len() as u64).sum()
    }

    pub fn is_request(&self) -> bool {
        self.start.as_ref().is_some_and(StartLine::is_request)
    }

    /// Chunked transfer coding needs HTTP/1.1 or above.
    pub fn does_support_chunks(&self) -> bool {
        self.start.as_ref().is_some_and(|start| start.version().supports_chunks())
    }

    /// How the current body would be framed if the whole message were sent now.
    pub fn payload_size(&self) -> PayloadSize {
        match self.content_length() {
            0 => PayloadSize::Empty,
            n => PayloadSize::Length(n),
        }
    }

    pub fn reset(&mut self, mode: ResetMode) {
        self.body.clear();
        if mode == ResetMode::All {
            self.start = None;
            self.headers.clear();
        }
    }

    /// Sets the `Connection` header and the body framing headers.
    ///
    /// A chunked message gets `Transfer-Encoding: chunked` and loses any `Content-Length`.
    /// Otherwise `Content-Length` is set to the current body size, except on requests without
    /// a body and on responses whose status forbids a body.
    pub fn finalize_headers(&mut self, keep_alive: bool, payload: PayloadSize) {
        self.headers.set(CONNECTION, if keep_alive { KEEP_ALIVE } else { CLOSE });

        if payload.is_chunked() {
            self.headers.remove(CONTENT_LENGTH);
            self.headers.set(TRANSFER_ENCODING, CHUNKED);
            return;
        }

        self.headers.remove(TRANSFER_ENCODING);
        let length = match payload {
            PayloadSize::Length(length) => length,
            _ => 0,
        };
        let may_have_body = match &self.start {
            Some(StartLine::Status(status)) => !status.is_bodiless(),
            Some(StartLine::Request(_)) => length > 0,
            None => false,
        };
        if may_have_body {
            self.headers.set(CONTENT_LENGTH, length.to_string());
        }
    }

    /// Appends the rendered head.
    ///
    /// # Errors
    ///
    /// Returns `SendError::MissingStartLine` when no start line was set.
    pub fn head(&self, spans: &mut Vec<Bytes>) -> Result<(), SendError> {
        let start = self.start.as_ref().ok_or(SendError::MissingStartLine)?;
        spans.push(HeadEncoder.encode_to_bytes(start, &self.headers));
        Ok(())
    }

    /// Appends the body spans unchanged.
    pub fn body(&self, spans: &mut Vec<Bytes>) {
        spans.extend(self.body.iter().cloned());
    }

    /// Appends the body spans framed as one chunk, or nothing if the body is empty.
    pub fn chunk(&self, spans: &mut Vec<Bytes>) {
        let length = self.content_length();
        if length == 0 {
            return;
        }

        spans.push(Bytes::from(format!("{length:x}\r\n")));
        self.body(spans);
        spans.push(Bytes::from_static(CRLF));
    }

    pub fn final_chunk(&self, spans: &mut Vec<Bytes>) {
        spans.push(Bytes::from_static(FINAL_CHUNK));
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::body::ChunkedBodyDecoder;
    use crate::protocol::Version;

    fn concat(spans: &[Bytes]) -> BytesMut {
        spans.iter().fold(BytesMut::new(), |mut acc, span| {
            acc.extend_from_slice(span);
            acc
        })
    }

    #[test]
    fn full_response() {
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
        serializer.set_header("Content-Type", "text/plain");
        serializer.append_static(b"hello ");
        serializer.append(Bytes::from_static(b"world"));
        serializer.finalize_headers(true, serializer.payload_size());

        let mut spans = Vec::new();
        serializer.head(&mut spans).unwrap();
        serializer.body(&mut spans);

        assert_eq!(
            concat(&spans),
            &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: Keep-Alive\r\nContent-Length: 11\r\n\r\nhello world"[..]
        );
    }

    #[test]
    fn body_spans_are_shared() {
        let data = Bytes::from(vec![7u8; 64]);
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
        serializer.append(data.clone());

        let mut spans = Vec::new();
        serializer.body(&mut spans);
        assert_eq!(spans[0].as_ptr(), data.as_ptr());
    }

    #[test]
    fn bodiless_response_gets_zero_length() {
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_10, 404));
        serializer.finalize_headers(false, PayloadSize::Empty);
        assert_eq!(serializer.headers().get("content-length"), Some("0"));
        assert_eq!(serializer.headers().get("connection"), Some("close"));

        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 204));
        serializer.finalize_headers(true, PayloadSize::Empty);
        assert!(!serializer.headers().contains("content-length"));

        let mut serializer = MessageSerializer::request(RequestLine::new("GET", "/", Version::HTTP_11));
        serializer.finalize_headers(true, PayloadSize::Empty);
        assert!(!serializer.headers().contains("content-length"));
    }

    #[test]
    fn chunked_headers_replace_length() {
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
        serializer.set_header("Content-Length", "10");
        serializer.finalize_headers(true, PayloadSize::Chunked);

        assert!(!serializer.headers().contains("content-length"));
        assert_eq!(serializer.headers().get("transfer-encoding"), Some("chunked"));
    }

    #[test]
    fn missing_start_line() {
        let serializer = MessageSerializer::new();
        assert!(matches!(serializer.head(&mut Vec::new()), Err(SendError::MissingStartLine)));
    }

    #[test]
    fn chunk_round_trip() {
        let pieces: [&[u8]; 4] = [b"hello", b"", &[b'x'; 300], b"\r\n0\r\n\r\n"];
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
        let mut spans = Vec::new();

        for piece in pieces {
            serializer.append(Bytes::copy_from_slice(piece));
            serializer.chunk(&mut spans);
            serializer.reset(ResetMode::Body);
        }
        let framed = concat(&spans);

        let mut decoder = ChunkedBodyDecoder::new(1024);
        assert_eq!(decoder.parse(&framed).unwrap(), framed.len());
        assert!(!decoder.is_finished());

        let mut terminal = Vec::new();
        serializer.final_chunk(&mut terminal);
        let terminal = concat(&terminal);
        for byte in terminal.iter() {
            assert!(!decoder.is_finished());
            decoder.parse(std::slice::from_ref(byte)).unwrap();
        }

        assert!(decoder.is_finished());
        assert_eq!(decoder.body(), pieces.concat());
    }

    #[test]
    fn reset_modes() {
        let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
        serializer.set_header("Etag", "\"1\"");
        serializer.append_static(b"abc");

        serializer.reset(ResetMode::Body);
        assert_eq!(serializer.content_length(), 0);
        assert_eq!(serializer.headers().len(), 1);
        assert!(serializer.does_support_chunks());

        serializer.reset(ResetMode::All);
        assert!(serializer.start_line().is_none());
        assert!(serializer.headers().is_empty());
        assert!(!serializer.does_support_chunks());
    }
}

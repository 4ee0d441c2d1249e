//! Serializes a start line and header fields into one contiguous span.
//!
//! The output is `start line CRLF`, then `Name: Value CRLF` for every header in insertion
//! order, then the empty line ending the header block.

use std::io;
use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{HeaderMultimap, StartLine};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 512;

/// Encoder for the head of a message: start line, header fields and the blank line.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadEncoder;

impl HeadEncoder {
    /// Renders the head into `dst`.
    pub fn encode(&self, start_line: &StartLine, headers: &HeaderMultimap, dst: &mut BytesMut) {
        dst.reserve(INIT_HEADER_SIZE);

        // writing into a BytesMut cannot fail
        let _ = write!(FastWrite(dst), "{start_line}\r\n");

        for (name, value) in headers.iter() {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }

    /// Renders the head into a fresh span.
    pub fn encode_to_bytes(&self, start_line: &StartLine, headers: &HeaderMultimap) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(start_line, headers, &mut dst);
        dst.freeze()
    }
}

/// Writes formatted text straight into a `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::protocol::{RequestLine, StatusLine, Version};

    #[test]
    fn encode_response_head() {
        let mut headers = HeaderMultimap::new();
        headers.add("Content-Type", "text/plain");
        headers.add("Content-Length", "5");

        let start = StartLine::from(StatusLine::with_reason(Version::HTTP_11, 404));
        let head = HeadEncoder.encode_to_bytes(&start, &headers);

        let expected = indoc! {r"
        HTTP/1.1 404 Not Found
        Content-Type: text/plain
        Content-Length: 5

        "}
        .replace('\n', "\r\n");
        assert_eq!(head, expected.as_bytes());
    }

    #[test]
    fn encode_request_head_without_headers() {
        let start = StartLine::from(RequestLine::new("GET", "/a?b=c", Version::HTTP_10));
        let head = HeadEncoder.encode_to_bytes(&start, &HeaderMultimap::new());

        assert_eq!(head, Bytes::from_static(b"GET /a?b=c HTTP/1.0\r\n\r\n"));
    }
}

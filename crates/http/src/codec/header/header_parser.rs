//! Incremental parser for the header block of an HTTP/1.x message.
//!
//! The parser consumes one byte at a time and keeps its position between calls, so the header
//! block may arrive split at any byte boundary across any number of reads. It stops right after
//! the empty line that terminates the block and never looks at the body.
//!
//! # Limits
//!
//! - Maximum number of header lines: 64
//! - Maximum header block size: 8KB
//!
//! # Implementation Details
//!
//! Every byte is appended to the current line while a small state machine tracks line ends:
//!
//! ```text
//! WantLineStart --any--> WantCr --CR--> WantLf --LF--> WantLineStart
//! ```
//!
//! A line starting with a space or tab continues the previous line (obsolete line folding).
//! Once the bare CRLF line is seen, line 0 is kept as the start line and the other lines are
//! split at their first `:` into the header multimap.

use std::sync::OnceLock;

use crate::ensure;
use crate::protocol::names::{CHUNKED, CLOSE, CONNECTION, CONTENT_LENGTH, KEEP_ALIVE, TRANSFER_ENCODING};
use crate::protocol::{HeaderMultimap, ParseError, RequestLine, StatusLine, Version};

/// Maximum number of header lines allowed in a message
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header block, start line included
const MAX_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    /// The next byte starts a new line, or continues the previous one if it is whitespace
    WantLineStart,
    /// Inside a line, waiting for its CR
    WantCr,
    /// Saw CR, waiting for LF
    WantLf,
    /// The terminating empty line was consumed
    Finished,
}

/// Parses the start line and header fields of a message, tolerant of split reads.
#[derive(Debug)]
pub struct HeaderBlockParser {
    state: LineState,
    lines: Vec<Vec<u8>>,
    total_size: usize,
    start_line: Option<String>,
    headers: HeaderMultimap,
    request_line: OnceLock<Result<RequestLine, ParseError>>,
    status_line: OnceLock<Result<StatusLine, ParseError>>,
}

impl Default for HeaderBlockParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBlockParser {
    pub fn new() -> Self {
        Self {
            state: LineState::WantLineStart,
            lines: Vec::new(),
            total_size: 0,
            start_line: None,
            headers: HeaderMultimap::new(),
            request_line: OnceLock::new(),
            status_line: OnceLock::new(),
        }
    }

    /// Feeds `bytes` to the parser and returns how many of them belong to the header block.
    ///
    /// When the block is still incomplete every byte is consumed and [`is_finished`] stays
    /// false. When the terminating empty line is found, parsing stops right after it; the rest of
    /// `bytes` is left for the body.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the block grows over 8KB or holds more than 64 header lines.
    ///
    /// [`is_finished`]: HeaderBlockParser::is_finished
    pub fn parse(&mut self, bytes: &[u8]) -> Result<usize, ParseError> {
        debug_assert!(self.state != LineState::Finished, "header block is already complete");
        if self.state == LineState::Finished {
            return Ok(0);
        }

        for (index, &octet) in bytes.iter().enumerate() {
            match self.state {
                LineState::WantLineStart => {
                    self.state = LineState::WantCr;
                    if !is_fold(octet) || self.lines.is_empty() {
                        // start line + header lines, the new line may still be the terminator
                        ensure!(self.lines.len() <= MAX_HEADER_NUM + 1, ParseError::too_many_headers(MAX_HEADER_NUM));
                        self.lines.push(Vec::new());
                    }
                }
                LineState::WantCr => {
                    if octet == b'\r' {
                        self.state = LineState::WantLf;
                    }
                }
                LineState::WantLf => {
                    self.state = match octet {
                        b'\n' => LineState::WantLineStart,
                        b'\r' => LineState::WantLf,
                        _ => LineState::WantCr,
                    };
                }
                LineState::Finished => unreachable!("parsing stops at the end of the header block"),
            }

            self.total_size += 1;
            ensure!(self.total_size <= MAX_HEADER_BYTES, ParseError::too_large_header(self.total_size, MAX_HEADER_BYTES));

            let Some(line) = self.lines.last_mut() else {
                unreachable!("a line is opened before its first byte")
            };
            line.push(octet);

            if line.as_slice() == b"\r\n" {
                self.lines.pop();
                self.finish();
                return Ok(index + 1);
            }
        }

        Ok(bytes.len())
    }

    fn finish(&mut self) {
        self.state = LineState::Finished;

        let mut lines = std::mem::take(&mut self.lines).into_iter().map(|raw| unfold(&raw));
        self.start_line = lines.next();

        let mut headers = HeaderMultimap::with_capacity(lines.len());
        for line in lines {
            match line.split_once(':') {
                Some((name, value)) => headers.add(name.trim(), value.trim()),
                None => headers.add(line.trim(), ""),
            }
        }
        headers.normalize();
        self.headers = headers;
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == LineState::Finished
    }

    /// The raw start line without its CRLF, once the block is complete.
    pub fn start_line(&self) -> Option<&str> {
        self.start_line.as_deref()
    }

    /// The start line parsed as a request line, parsed on first access.
    pub fn request_line(&self) -> Result<&RequestLine, ParseError> {
        self.request_line
            .get_or_init(|| self.start_line().ok_or_else(|| ParseError::invalid_start_line("missing start line"))?.parse())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The start line parsed as a status line, parsed on first access.
    pub fn status_line(&self) -> Result<&StatusLine, ParseError> {
        self.status_line
            .get_or_init(|| self.start_line().ok_or_else(|| ParseError::invalid_start_line("missing start line"))?.parse())
            .as_ref()
            .map_err(Clone::clone)
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    pub(crate) fn take_headers(&mut self) -> HeaderMultimap {
        std::mem::take(&mut self.headers)
    }

    /// Returns true if `Transfer-Encoding` mentions `chunked`, ignoring case.
    pub fn is_chunked(&self) -> bool {
        is_chunked(self.headers.get(TRANSFER_ENCODING))
    }

    /// The declared body length, or `None` if `Content-Length` is missing or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get(CONTENT_LENGTH).and_then(|value| value.trim().parse::<u64>().ok())
    }

    /// Whether the connection should stay open after this message.
    ///
    /// HTTP/1.1 and above keep the connection unless `Connection: close` is present, HTTP/1.0
    /// closes it unless `Connection: Keep-Alive` is present. A start line that does not parse
    /// closes the connection.
    pub fn keep_alive(&self, is_request: bool) -> bool {
        let version = if is_request {
            self.request_line().map(RequestLine::version)
        } else {
            self.status_line().map(StatusLine::version)
        };

        match version {
            Ok(version) if version >= Version::HTTP_11 => !self.headers.contains_token(CONNECTION, CLOSE),
            Ok(_) => self.headers.contains_token(CONNECTION, KEEP_ALIVE),
            Err(_) => false,
        }
    }
}

#[inline]
fn is_fold(octet: u8) -> bool {
    octet == b' ' || octet == b'\t'
}

/// Turns a raw line into text, replacing each folded line break by one space.
fn unfold(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\r', '\n']);
    if !text.contains("\r\n") {
        return text.to_string();
    }
    text.split("\r\n").map(|part| part.trim_start_matches([' ', '\t'])).collect::<Vec<_>>().join(" ")
}

fn is_chunked(header_value: Option<&str>) -> bool {
    header_value.is_some_and(|value| value.to_ascii_lowercase().contains(CHUNKED))
}

//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module decodes message bodies that use chunked transfer encoding as specified in
//! [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1), incrementally and
//! under a limit on the accumulated body size.
//!
//! Only the plain form is accepted: every chunk is `<hex size>CRLF<data>CRLF` and the body ends
//! with `0CRLFCRLF`. Chunk extensions and trailer fields are rejected.

use std::task::Poll;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::protocol::ParseError;
use ChunkedState::*;

/// A decoder for the chunked transfer coding.
///
/// The decoder keeps its position across calls to [`parse`](ChunkedBodyDecoder::parse), so the
/// framing may be split at any byte. Chunk data is collected into a single body buffer that
/// never grows past the configured maximum: a chunk whose declared size would cross it fails the
/// decode before any of its bytes are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBodyDecoder {
    state: ChunkedState,
    /// Declared size of the chunk being read, then the bytes of it still expected
    chunk_size: u64,
    body: BytesMut,
    max_body_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the first hex digit of a chunk size
    SizeStart,
    /// Read more hex digits, or the CR ending the size line
    SizeDigits,
    /// Read LF after the chunk size
    SizeLf,
    /// Read chunk data
    Data,
    /// Read CR after chunk data
    DataCr,
    /// Read LF after chunk data
    DataLf,
    /// Read CR of the empty line after the last chunk
    LastCr,
    /// Read LF of the empty line after the last chunk
    LastLf,
    /// The whole body was decoded
    Finished,
    /// The framing was invalid or the body too large
    Failed,
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        match $src.split_first() {
            Some((&byte, rest)) => {
                *$src = rest;
                byte
            }
            None => return Poll::Pending,
        }
    }};
}

impl ChunkedBodyDecoder {
    /// Creates a decoder accepting at most `max_body_size` bytes of chunk data.
    pub fn new(max_body_size: usize) -> Self {
        Self { state: SizeStart, chunk_size: 0, body: BytesMut::new(), max_body_size }
    }

    /// Decodes as much of `src` as possible and returns the number of bytes consumed.
    ///
    /// Consumption stops right after the terminating empty line, so bytes of a following
    /// message are never touched.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the framing is invalid or the body would exceed the maximum size.
    /// The decoder then stays failed and every later call fails as well.
    pub fn parse(&mut self, src: &[u8]) -> Result<usize, ParseError> {
        if self.state == Failed {
            return Err(ParseError::invalid_chunk("decoder has already failed"));
        }

        let mut remaining = src;
        while self.state != Finished {
            match self.step(&mut remaining) {
                Poll::Pending => break,
                Poll::Ready(Ok(new_state)) => self.state = new_state,
                Poll::Ready(Err(e)) => {
                    self.state = Failed;
                    return Err(e);
                }
            }
        }

        if self.state == Finished {
            trace!(body_size = self.body.len(), "finished reading chunked data");
        }
        Ok(src.len() - remaining.len())
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == Finished
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.state == Failed
    }

    /// The chunk data decoded so far.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    fn step(&mut self, src: &mut &[u8]) -> Poll<Result<ChunkedState, ParseError>> {
        match self.state {
            SizeStart => Self::read_size_start(src, &mut self.chunk_size),
            SizeDigits => Self::read_size_digits(src, &mut self.chunk_size),
            SizeLf => Self::read_size_lf(src, self.chunk_size, self.body.len(), self.max_body_size),
            Data => Self::read_data(src, &mut self.chunk_size, &mut self.body),
            DataCr => Self::read_data_cr(src),
            DataLf => Self::read_data_lf(src, &mut self.chunk_size),
            LastCr => Self::read_last_cr(src),
            LastLf => Self::read_last_lf(src),
            Finished => Poll::Ready(Ok(Finished)),
            Failed => Poll::Ready(Err(ParseError::invalid_chunk("decoder has already failed"))),
        }
    }

    /// Reads the first digit of a chunk size.
    ///
    /// # State Transitions
    /// - On hex digit: Move to SizeDigits
    /// - On any other byte: Return error
    fn read_size_start(src: &mut &[u8], chunk_size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let b = try_next_byte!(src);
        match hex_value(b) {
            Some(value) => {
                *chunk_size = u64::from(value);
                Poll::Ready(Ok(SizeDigits))
            }
            None => Poll::Ready(Err(ParseError::invalid_chunk(format!("invalid chunk size byte {b:#04x}")))),
        }
    }

    /// Reads the remaining digits of a chunk size.
    ///
    /// A size that starts with `0` may not have more digits: `0` alone is the last chunk.
    ///
    /// # State Transitions
    /// - On hex digit: Stay in SizeDigits
    /// - On CR: Move to SizeLf
    /// - On leading zero padding, overflow or any other byte: Return error
    fn read_size_digits(src: &mut &[u8], chunk_size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let b = try_next_byte!(src);
        if b == b'\r' {
            return Poll::Ready(Ok(SizeLf));
        }

        let Some(value) = hex_value(b) else {
            return Poll::Ready(Err(ParseError::invalid_chunk(format!("invalid chunk size byte {b:#04x}"))));
        };

        if *chunk_size == 0 {
            return Poll::Ready(Err(ParseError::invalid_chunk("chunk size has leading zeros")));
        }

        match chunk_size.checked_mul(16).and_then(|size| size.checked_add(u64::from(value))) {
            Some(size) => {
                *chunk_size = size;
                Poll::Ready(Ok(SizeDigits))
            }
            None => Poll::Ready(Err(ParseError::invalid_chunk("invalid overflow chunked length"))),
        }
    }

    /// Validates the LF after the chunk size and checks the size limit.
    ///
    /// # State Transitions
    /// - On LF with size 0: Move to LastCr for the final empty line
    /// - On LF with a size that fits under the limit: Move to Data
    /// - On LF with a size over the limit: Return error
    /// - On any other byte: Return error
    fn read_size_lf(src: &mut &[u8], chunk_size: u64, body_size: usize, max_body_size: usize) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if chunk_size == 0 => Poll::Ready(Ok(LastCr)),
            b'\n' => {
                let available = max_body_size.saturating_sub(body_size) as u64;
                if chunk_size > available {
                    return Poll::Ready(Err(ParseError::body_too_large(max_body_size)));
                }
                Poll::Ready(Ok(Data))
            }
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size LF"))),
        }
    }

    /// Reads chunk data bytes.
    ///
    /// # State Transitions
    /// - On empty input: Wait for more data
    /// - After reading data with remaining size > 0: Stay in Data
    /// - After reading data with remaining size = 0: Move to DataCr
    fn read_data(src: &mut &[u8], chunk_size: &mut u64, body: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        if src.is_empty() {
            return Poll::Pending;
        }

        // the size limit already keeps chunk_size within usize
        let read_size = usize::try_from(*chunk_size).map_or(src.len(), |size| size.min(src.len()));
        let (data, rest) = src.split_at(read_size);
        body.extend_from_slice(data);
        *src = rest;
        *chunk_size -= read_size as u64;

        trace!(len = read_size, "read chunked bytes");
        if *chunk_size > 0 { Poll::Ready(Ok(Data)) } else { Poll::Ready(Ok(DataCr)) }
    }

    /// Validates the CR after chunk data.
    ///
    /// # State Transitions
    /// - On CR: Move to DataLf
    /// - On any other byte: Return error
    fn read_data_cr(src: &mut &[u8]) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(DataLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body CR"))),
        }
    }

    /// Validates the LF after chunk data.
    ///
    /// # State Transitions
    /// - On LF: Move back to SizeStart for the next chunk
    /// - On any other byte: Return error
    fn read_data_lf(src: &mut &[u8], chunk_size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                *chunk_size = 0;
                Poll::Ready(Ok(SizeStart))
            }
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body LF"))),
        }
    }

    /// Validates the CR of the empty line closing the body.
    ///
    /// # State Transitions
    /// - On CR: Move to LastLf
    /// - On any other byte (a trailer field): Return error
    fn read_last_cr(src: &mut &[u8]) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(LastLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("trailer fields are not supported"))),
        }
    }

    /// Validates the LF of the empty line closing the body.
    ///
    /// # State Transitions
    /// - On LF: Move to Finished
    /// - On any other byte: Return error
    fn read_last_lf(src: &mut &[u8]) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Finished)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk end LF"))),
        }
    }
}

#[inline]
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b + 10 - b'a'),
        b'A'..=b'F' => Some(b + 10 - b'A'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024 * 1024;

    fn decode_all(input: &[u8]) -> (ChunkedBodyDecoder, Result<usize, ParseError>) {
        let mut decoder = ChunkedBodyDecoder::new(MAX);
        let result = decoder.parse(input);
        (decoder, result)
    }

    #[test]
    fn test_basic() {
        let input = b"10\r\n1234567890abcdef\r\n0\r\n\r\n";
        let (decoder, result) = decode_all(input);

        assert_eq!(result.unwrap(), input.len());
        assert!(decoder.is_finished());
        assert_eq!(decoder.body(), b"1234567890abcdef");
    }

    #[test]
    fn test_multiple_chunks() {
        let input = b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n";
        let (decoder, result) = decode_all(input);

        assert_eq!(result.unwrap(), input.len());
        assert_eq!(decoder.body(), b"hello, world");
    }

    #[test]
    fn stops_at_end_of_body() {
        let input = b"3\r\nabc\r\n0\r\n\r\nGET / HTTP/1.1\r\n";
        let (decoder, result) = decode_all(input);

        let consumed = result.unwrap();
        assert_eq!(consumed, 13);
        assert!(input[consumed..].starts_with(b"GET"));
        assert!(decoder.is_finished());
        assert_eq!(decoder.body(), b"abc");
    }

    #[test]
    fn split_at_every_point() {
        let input = b"5\r\nhello\r\nA\r\n0123456789\r\n0\r\n\r\n";

        for cut in 0..=input.len() {
            let mut decoder = ChunkedBodyDecoder::new(MAX);
            let first = decoder.parse(&input[..cut]).unwrap();
            assert_eq!(first, cut, "cut at {cut}");
            assert_eq!(decoder.is_finished(), cut == input.len(), "cut at {cut}");

            let second = decoder.parse(&input[cut..]).unwrap();
            assert_eq!(first + second, input.len());
            assert!(decoder.is_finished());
            assert_eq!(decoder.body(), b"hello0123456789");
        }
    }

    #[test]
    fn byte_at_a_time() {
        let input = b"1a\r\nabcdefghijklmnopqrstuvwxyz\r\n0\r\n\r\n";
        let mut decoder = ChunkedBodyDecoder::new(MAX);

        for byte in input {
            assert!(!decoder.is_finished());
            assert_eq!(decoder.parse(std::slice::from_ref(byte)).unwrap(), 1);
        }

        assert!(decoder.is_finished());
        assert_eq!(decoder.body(), b"abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut decoder = ChunkedBodyDecoder::new(MAX);

        assert_eq!(decoder.parse(b"5\r\nhel").unwrap(), 6);
        assert!(!decoder.is_finished());
        assert_eq!(decoder.body(), b"hel");

        assert_eq!(decoder.parse(b"lo\r\n0\r\n").unwrap(), 7);
        assert!(!decoder.is_finished());

        assert_eq!(decoder.parse(b"\r\n").unwrap(), 2);
        assert!(decoder.is_finished());
        assert_eq!(decoder.take_body(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_zero_size_chunk() {
        let (decoder, result) = decode_all(b"0\r\n\r\n");

        assert_eq!(result.unwrap(), 5);
        assert!(decoder.is_finished());
        assert!(decoder.body().is_empty());
    }

    #[test]
    fn uppercase_hex() {
        let (decoder, result) = decode_all(b"B\r\nhello world\r\n0\r\n\r\n");

        assert!(result.is_ok());
        assert_eq!(decoder.body(), b"hello world");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let (decoder, result) = decode_all(b"xyz\r\n");
        assert!(matches!(result, Err(ParseError::InvalidChunk { .. })));
        assert!(decoder.is_failed());

        let (_, result) = decode_all(b"5;ext=1\r\nhello\r\n0\r\n\r\n");
        assert!(result.is_err());
    }

    #[test]
    fn leading_zero_is_rejected() {
        assert!(decode_all(b"05\r\nhello\r\n0\r\n\r\n").1.is_err());
        assert!(decode_all(b"00\r\n\r\n").1.is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let (decoder, result) = decode_all(b"5\r\nhelloBad");
        assert!(result.is_err());
        assert!(decoder.is_failed());

        let (_, result) = decode_all(b"5\rXhello\r\n");
        assert!(result.is_err());
    }

    #[test]
    fn trailers_are_rejected() {
        let (_, result) = decode_all(b"5\r\nhello\r\n0\r\nTrailer: value\r\n\r\n");
        assert!(result.is_err());
    }

    #[test]
    fn failed_decoder_stays_failed() {
        let mut decoder = ChunkedBodyDecoder::new(MAX);
        assert!(decoder.parse(b"g").is_err());
        assert!(decoder.parse(b"0\r\n\r\n").is_err());
        assert!(!decoder.is_finished());
    }

    #[test]
    fn size_overflow() {
        let (_, result) = decode_all(b"fffffffffffffffff\r\n");
        assert!(matches!(result, Err(ParseError::InvalidChunk { .. })));
    }

    #[test]
    fn max_body_size_enforced() {
        let mut decoder = ChunkedBodyDecoder::new(8);

        assert_eq!(decoder.parse(b"5\r\nhello\r\n").unwrap(), 10);
        let result = decoder.parse(b"4\r\nabcd\r\n0\r\n\r\n");

        assert_eq!(result, Err(ParseError::body_too_large(8)));
        assert!(decoder.is_failed());
        assert_eq!(decoder.body(), b"hello");
    }

    #[test]
    fn body_exactly_at_max() {
        let mut decoder = ChunkedBodyDecoder::new(8);
        assert!(decoder.parse(b"3\r\nabc\r\n5\r\ndefgh\r\n0\r\n\r\n").is_ok());
        assert!(decoder.is_finished());
        assert_eq!(decoder.body(), b"abcdefgh");
    }

    #[test]
    fn test_large_chunk() {
        let size = 512 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{size:x}\r\n").into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let (decoder, result) = decode_all(&data);

        assert_eq!(result.unwrap(), data.len());
        assert_eq!(decoder.body().len(), size);
        assert!(decoder.body().iter().all(|&b| b == b'A'));
    }
}

//! Decoder for bodies framed by `Content-Length` or by the end of the connection.
//!
//! See [RFC 7230 Section 3.3.3](https://tools.ietf.org/html/rfc7230#section-3.3.3) for the
//! message body length rules this decoder serves.

use std::cmp;

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// How the end of a body is found.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyLength {
    /// The body is exactly this many bytes long
    Exactly(u64),
    /// The body runs until the peer closes the connection
    UntilClose,
}

/// A decoder for bodies of known length, or of unknown length ended by connection close.
///
/// The decoder never retains more than its maximum body size. Once the limit is reached while
/// the body still has bytes to come, [`parse`](BoundedBodyDecoder::parse) consumes nothing and
/// the caller decides how to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedBodyDecoder {
    length: BodyLength,
    /// Bytes still expected in `Exactly` mode
    remaining: u64,
    finished: bool,
    body: BytesMut,
    max_body_size: usize,
}

impl BoundedBodyDecoder {
    pub fn new(max_body_size: usize) -> Self {
        Self { length: BodyLength::Exactly(0), remaining: 0, finished: true, body: BytesMut::new(), max_body_size }
    }

    /// Prepares the decoder for a new body, dropping anything collected before.
    pub fn reset(&mut self, length: BodyLength) {
        self.length = length;
        self.body.clear();
        match length {
            BodyLength::Exactly(n) => {
                self.remaining = n;
                self.finished = n == 0;
                if let Ok(n) = usize::try_from(n) {
                    self.body.reserve(cmp::min(n, self.max_body_size));
                }
            }
            BodyLength::UntilClose => {
                self.remaining = 0;
                self.finished = false;
            }
        }
    }

    /// Collects body bytes from `bytes` and returns how many were consumed.
    ///
    /// Returns 0 when the body is complete, or when the maximum size was reached while bytes
    /// were still expected.
    pub fn parse(&mut self, bytes: &[u8]) -> usize {
        if self.finished {
            return 0;
        }

        let room = self.max_body_size.saturating_sub(self.body.len());
        let wanted = match self.length {
            BodyLength::Exactly(_) => usize::try_from(self.remaining).map_or(bytes.len(), |r| cmp::min(r, bytes.len())),
            BodyLength::UntilClose => bytes.len(),
        };
        let taken = cmp::min(wanted, room);

        self.body.extend_from_slice(&bytes[..taken]);
        if let BodyLength::Exactly(_) = self.length {
            self.remaining -= taken as u64;
            if self.remaining == 0 {
                self.finished = true;
                trace!(body_size = self.body.len(), "finished reading body");
            }
        }

        taken
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the body ends with the connection rather than after a declared length.
    #[inline]
    pub fn is_until_close(&self) -> bool {
        self.length == BodyLength::UntilClose
    }

    /// Bytes still expected, or `None` for a body that runs until close.
    pub fn remaining(&self) -> Option<u64> {
        match self.length {
            BodyLength::Exactly(_) => Some(self.remaining),
            BodyLength::UntilClose => None,
        }
    }

    /// Ends the body at the current position.
    pub fn set_finished(&mut self) {
        self.finished = true;
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

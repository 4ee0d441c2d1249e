use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("read error: {source}")]
    ReadError {
        #[from]
        source: ReadError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Reasons a message parse ends in the failed state.
///
/// Parse errors never abort the connection task on their own: the failed message is still
/// handed to the message handler so that it can answer with a well formed error response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid start line: {reason}")]
    InvalidStartLine { reason: String },

    #[error("invalid http version: {version:?}")]
    InvalidVersion { version: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("body size exceed the limit {max_size}")]
    BodyTooLarge { max_size: usize },

    #[error("message ended before the body was complete")]
    IncompleteMessage,
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_start_line<S: ToString>(str: S) -> Self {
        Self::InvalidStartLine { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(str: S) -> Self {
        Self::InvalidVersion { version: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn body_too_large(max_size: usize) -> Self {
        Self::BodyTooLarge { max_size }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("message has no start line")]
    MissingStartLine,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failures that end a connection instead of a single message.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("no data received within {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    #[error("connection closed while a message was incomplete")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ReadError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if the peer went away before sending any byte of the next message.
    pub fn is_idle_close(&self) -> bool {
        matches!(self, ReadError::Closed)
    }
}

//! Request lines, status lines and protocol versions.
//!
//! Both start line kinds parse from the raw first line of a message (with or without the trailing
//! CRLF) and render back without the CRLF. Rendering a parsed line reproduces the input
//! byte-for-byte for every line this crate writes itself.

use std::fmt;
use std::str::FromStr;

use http::{Method, StatusCode};

use crate::ensure;
use crate::protocol::ParseError;
use crate::protocol::names::METHOD_HEAD;

/// The `HTTP/<major>.<minor>` protocol version of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const HTTP_10: Version = Version::new(1, 0);
    pub const HTTP_11: Version = Version::new(1, 1);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Chunked transfer coding exists since HTTP/1.1.
    #[inline]
    pub fn supports_chunks(&self) -> bool {
        *self >= Version::HTTP_11
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_11
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let numbers = s.strip_prefix("HTTP/").ok_or_else(|| ParseError::invalid_version(s))?;
        let (major, minor) = numbers.split_once('.').ok_or_else(|| ParseError::invalid_version(s))?;
        ensure!(is_digits(major) && is_digits(minor), ParseError::invalid_version(s));

        let major = major.parse::<u16>().map_err(|_| ParseError::invalid_version(s))?;
        let minor = minor.parse::<u16>().map_err(|_| ParseError::invalid_version(s))?;
        Ok(Version::new(major, minor))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_line_end(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// `METHOD SP path[?query] SP HTTP/<major>.<minor>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    pub query: String,
    pub version_major: u16,
    pub version_minor: u16,
}

impl RequestLine {
    /// Builds a request line, splitting `target` into path and query at the first `?`.
    pub fn new<M: Into<String>>(method: M, target: &str, version: Version) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.into(),
            path: path.to_string(),
            query: query.to_string(),
            version_major: version.major,
            version_minor: version.minor,
        }
    }

    #[inline]
    pub fn version(&self) -> Version {
        Version::new(self.version_major, self.version_minor)
    }

    #[inline]
    pub fn is_head(&self) -> bool {
        self.method == METHOD_HEAD
    }
}

impl FromStr for RequestLine {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = strip_line_end(line);
        let mut tokens = line.split(' ').filter(|token| !token.is_empty());

        let (Some(method), Some(target), Some(version), None) = (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(ParseError::invalid_start_line(format!("request line {line:?} is not `method target version`")));
        };

        // http::Method validates the token grammar, extension methods included
        Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::invalid_start_line(format!("invalid method {method:?}")))?;

        Ok(RequestLine::new(method, target, version.parse()?))
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)?;
        f.write_str(" ")?;
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        write!(f, " {}", self.version())
    }
}

/// `HTTP/<major>.<minor> SP code SP reason`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusLine {
    pub version_major: u16,
    pub version_minor: u16,
    pub code: u32,
    pub reason: String,
}

impl StatusLine {
    pub fn new<R: Into<String>>(version: Version, code: u32, reason: R) -> Self {
        Self { version_major: version.major, version_minor: version.minor, code, reason: reason.into() }
    }

    /// Builds a status line carrying the canonical reason phrase of `code`.
    pub fn with_reason(version: Version, code: u16) -> Self {
        let reason = StatusCode::from_u16(code).ok().and_then(|status| status.canonical_reason()).unwrap_or("Unknown");
        StatusLine::new(version, u32::from(code), reason)
    }

    #[inline]
    pub fn version(&self) -> Version {
        Version::new(self.version_major, self.version_minor)
    }

    /// Responses with these codes never carry a body, whatever their headers say.
    #[inline]
    pub fn is_bodiless(&self) -> bool {
        matches!(self.code, 100..=199 | 204 | 205 | 304)
    }
}

impl FromStr for StatusLine {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = strip_line_end(line);
        let mut parts = line.splitn(3, ' ');

        let version: Version = parts.next().unwrap_or_default().parse()?;

        let code = parts.next().unwrap_or_default();
        ensure!(code.len() == 3 && is_digits(code), ParseError::invalid_start_line(format!("invalid status code {code:?}")));
        let code = code.parse::<u32>().map_err(|_| ParseError::invalid_start_line(format!("invalid status code {code:?}")))?;

        let reason = parts.next().unwrap_or_default();
        Ok(StatusLine::new(version, code, reason))
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version(), self.code, self.reason)
    }
}

/// The first line of either kind of message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StartLine {
    Request(RequestLine),
    Status(StatusLine),
}

impl StartLine {
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, StartLine::Request(_))
    }

    pub fn version(&self) -> Version {
        match self {
            StartLine::Request(line) => line.version(),
            StartLine::Status(line) => line.version(),
        }
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Request(line) => line.fmt(f),
            StartLine::Status(line) => line.fmt(f),
        }
    }
}

impl From<RequestLine> for StartLine {
    fn from(line: RequestLine) -> Self {
        StartLine::Request(line)
    }
}

impl From<StatusLine> for StartLine {
    fn from(line: StatusLine) -> Self {
        StartLine::Status(line)
    }
}

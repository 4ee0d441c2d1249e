//! Header names and request methods the engine reads or writes itself.
//!
//! Names are spelled the way they are serialized; lookups through
//! [`HeaderMultimap`](super::HeaderMultimap) ignore case.

pub const HOST: &str = "Host";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const AUTHORIZATION: &str = "Authorization";
pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
pub const ETAG: &str = "Etag";
pub const IF_MATCH: &str = "If-Match";
pub const IF_NONE_MATCH: &str = "If-None-Match";

pub const CHUNKED: &str = "chunked";
pub const KEEP_ALIVE: &str = "Keep-Alive";
pub const CLOSE: &str = "close";

pub const METHOD_HEAD: &str = "HEAD";
pub const METHOD_GET: &str = "GET";
pub const METHOD_PUT: &str = "PUT";
pub const METHOD_POST: &str = "POST";
pub const METHOD_DELETE: &str = "DELETE";

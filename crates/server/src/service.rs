//! The application side of the server: resolving targets and answering resource requests.

use std::error::Error;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use reactor_http::protocol::ParsedMessage;
use reactor_http::protocol::names::{CONTENT_TYPE, IF_MATCH, IF_NONE_MATCH};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Where a request points: the domain it is authenticated against and the resource within it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub domain: String,
    pub resource: String,
}

impl Target {
    pub fn new<D: Into<String>, R: Into<String>>(domain: D, resource: R) -> Self {
        Self { domain: domain.into(), resource: resource.into() }
    }
}

/// A request reduced to what a resource handler works with.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    pub method: String,
    pub target: Target,
    pub query: String,
    pub username: Option<String>,
    pub content_type: Option<String>,
    pub if_match: Vec<String>,
    pub if_none_match: Vec<String>,
    pub body: Bytes,
}

impl ResourceRequest {
    /// Copies the method, query, user, body and precondition headers out of `message`.
    ///
    /// `If-Match` and `If-None-Match` are split into their comma separated entity tags.
    pub fn from_message(message: &ParsedMessage, target: Target) -> Self {
        let headers = message.headers();
        let entity_tags = |name: &'static str| {
            headers
                .get_all(name)
                .flat_map(|value| value.split(','))
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        Self {
            method: message.method().unwrap_or_default().to_string(),
            target,
            query: message.query().unwrap_or_default().to_string(),
            username: message.username().map(str::to_string),
            content_type: message.header(CONTENT_TYPE).map(str::to_string),
            if_match: entity_tags(IF_MATCH),
            if_none_match: entity_tags(IF_NONE_MATCH),
            body: message.body().clone(),
        }
    }
}

/// What a resource handler answers.
#[derive(Debug)]
pub struct ResourceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl ResourceResponse {
    pub fn new(status: u16) -> Self {
        Self { status, content_type: None, etag: None, headers: Vec::new(), body: ResponseBody::empty() }
    }

    pub fn with_body<B: Into<ResponseBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The body of a [`ResourceResponse`], either in memory or produced as a stream.
pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)) }
    }

    /// A body of unknown length, sent with chunked transfer coding where the peer supports it.
    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self { inner: Kind::Stream(body.map_err(Into::into).boxed_unsync()) }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("Once").field(bytes).finish(),
            Kind::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self::once(bytes) }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::from(Bytes::from_static(value.as_bytes()))
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(bytes) => Poll::Ready(bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::Stream(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(body) => body.size_hint(),
        }
    }
}

/// The application a [`RequestHandler`](crate::RequestHandler) dispatches to.
///
/// Implement the `Send` variant, `Service`; `LocalService` follows from it.
#[trait_variant::make(Service: Send)]
pub trait LocalService {
    /// Maps the request target to a domain and resource, failing for targets the service does
    /// not serve.
    fn parse_request_target(&self, message: &ParsedMessage) -> Result<Target, BoxError>;

    fn create_request_object(&self, message: &ParsedMessage, target: Target) -> ResourceRequest {
        ResourceRequest::from_message(message, target)
    }

    async fn handle_resource(&self, request: ResourceRequest) -> Result<ResourceResponse, BoxError>;

    /// The stored password of `name`, or `None` for an unknown user.
    fn resolve_user(&self, name: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use http_body_util::StreamBody;
    use reactor_http::codec::MessageParser;

    use super::*;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ResponseBody>();
        check_send::<ResourceResponse>();
    }

    #[test]
    fn request_from_message() {
        let input = b"PUT /users/alice?force=1 HTTP/1.1\r\nContent-Type: text/plain\r\nIf-Match: \"a\", \"b\"\r\nIf-Match: \"c\"\r\nIf-None-Match: *\r\nContent-Length: 2\r\n\r\nhi";
        let mut parser = MessageParser::request(1024);
        parser.parse(input).unwrap();
        let mut message = parser.into_message();
        message.set_username("alice");

        let request = ResourceRequest::from_message(&message, Target::new("users", "alice"));
        assert_eq!(request.method, "PUT");
        assert_eq!(request.query, "force=1");
        assert_eq!(request.username.as_deref(), Some("alice"));
        assert_eq!(request.content_type.as_deref(), Some("text/plain"));
        assert_eq!(request.if_match, ["\"a\"", "\"b\"", "\"c\""]);
        assert_eq!(request.if_none_match, ["*"]);
        assert_eq!(request.body, Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn once_body() {
        let mut body = ResponseBody::from("Hello world");
        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));
        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_body() {
        let mut body = ResponseBody::from("");
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn stream_body() {
        let frames = vec![Ok::<_, std::io::Error>(Frame::data(Bytes::from("a"))), Ok(Frame::data(Bytes::from("b")))];
        let body = ResponseBody::stream(StreamBody::new(stream::iter(frames)));
        assert_eq!(body.size_hint().exact(), None);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from("ab"));
    }
}

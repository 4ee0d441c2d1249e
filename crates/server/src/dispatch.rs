//! Turns parsed requests into calls of a [`Service`] and writes back what it answers.
//!
//! For every message the dispatcher:
//!
//! 1. answers 400 if the message failed to parse
//! 2. answers 405 unless the method is `GET`, `PUT` or `DELETE`
//! 3. asks the service for the target, answering 400 if it has none
//! 4. asks the [`Authenticator`] about the credentials, answering 400 or a 401 digest challenge
//! 5. hands the request object to the service and sends its response, or 500 if it failed

use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use reactor_http::codec::MessageSerializer;
use reactor_http::connection::{Connection, Lifecycle, MessageWriter};
use reactor_http::handler::MessageHandler;
use reactor_http::protocol::names::{CONTENT_TYPE, ETAG, METHOD_DELETE, METHOD_GET, METHOD_PUT, WWW_AUTHENTICATE};
use reactor_http::protocol::{ParsedMessage, SendError, StatusLine, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::{AuthOutcome, Authenticator, UserResolver};
use crate::service::{ResourceResponse, ResponseBody, Service};

const ALLOWED_METHODS: [&str; 3] = [METHOD_GET, METHOD_PUT, METHOD_DELETE];

/// The [`MessageHandler`] of a [`Server`](crate::Server) built around a [`Service`].
#[derive(Debug)]
pub struct RequestHandler<V, A> {
    service: V,
    authenticator: A,
}

impl<V, A> RequestHandler<V, A> {
    pub fn new(service: V, authenticator: A) -> Self {
        Self { service, authenticator }
    }

    pub fn service(&self) -> &V {
        &self.service
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }
}

impl<S, V, A> MessageHandler<S> for RequestHandler<V, A>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    V: Service + Sync,
    A: Authenticator,
{
    async fn on_message_complete(&self, mut message: ParsedMessage, conn: &mut Connection<S>) {
        let response = self.dispatch(&mut message).await;
        debug!(method = message.method(), path = message.path(), status = response.status, "dispatched request");

        if let Err(e) = respond(message.version(), response, conn).await {
            warn!(cause = %e, "failed to send response");
        }
    }
}

impl<V, A> RequestHandler<V, A>
where
    V: Service + Sync,
    A: Authenticator,
{
    async fn dispatch(&self, message: &mut ParsedMessage) -> ResourceResponse {
        if !message.is_finished() {
            return ResourceResponse::new(400);
        }

        if !message.method().is_some_and(|method| ALLOWED_METHODS.contains(&method)) {
            return ResourceResponse::new(405).with_header("Allow", ALLOWED_METHODS.join(", "));
        }

        let target = match self.service.parse_request_target(message) {
            Ok(target) => target,
            Err(e) => {
                debug!(cause = %e, path = message.path(), "no resource for request target");
                return ResourceResponse::new(400);
            }
        };

        match self.authenticator.authenticate(message, &target.domain, &ServiceUsers(&self.service)) {
            AuthOutcome::Authenticated(username) => message.set_username(username),
            AuthOutcome::BadRequest => return ResourceResponse::new(400),
            AuthOutcome::Unauthorized => return self.challenge(&target.domain),
        }

        let request = self.service.create_request_object(message, target);
        match self.service.handle_resource(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(cause = %e, "failed to handle resource");
                ResourceResponse::new(500)
            }
        }
    }

    /// A 401 carrying a digest challenge with a fresh nonce, registered with the authenticator.
    fn challenge(&self, domain: &str) -> ResourceResponse {
        let nonce = Uuid::new_v4().to_string();
        self.authenticator.register_nonce(&nonce);
        ResourceResponse::new(401)
            .with_header(WWW_AUTHENTICATE, format!("Digest qop=\"auth\", realm=\"{domain}\", nonce=\"{nonce}\""))
    }
}

struct ServiceUsers<'a, V>(&'a V);

impl<V: Service> UserResolver for ServiceUsers<'_, V> {
    fn resolve_user(&self, name: &str) -> Option<String> {
        self.0.resolve_user(name)
    }
}

/// Writes `response` in the version of the request.
///
/// Bodies of known size go out with `Content-Length`. Streams are sent chunk by chunk where the
/// version allows it and collected first otherwise.
async fn respond<S>(version: Version, response: ResourceResponse, conn: &mut Connection<S>) -> Result<(), SendError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ResourceResponse { status, content_type, etag, headers, mut body } = response;

    let status_line = StatusLine::with_reason(version, status);
    if status_line.is_bodiless() {
        body = ResponseBody::empty();
    }

    let mut serializer = MessageSerializer::response(status_line);
    if let Some(content_type) = content_type {
        serializer.set_header(CONTENT_TYPE, content_type);
    }
    if let Some(etag) = etag {
        serializer.set_header(ETAG, etag);
    }
    for (name, value) in headers {
        serializer.set_header(name, value);
    }

    let mut writer = MessageWriter::new(serializer);
    if body.size_hint().exact().is_some() || !writer.serializer().does_support_chunks() {
        match body.collect().await {
            Ok(collected) => writer.serializer_mut().append(collected.to_bytes()),
            Err(e) => {
                error!(cause = %e, "failed to produce response body");
                return send_internal_error(version, conn).await;
            }
        }
        writer.send(conn).await?;
        return Ok(());
    }

    let mut started = false;
    while let Some(frame) = body.frame().await {
        let data = match frame {
            Ok(frame) => frame.into_data().unwrap_or_default(),
            Err(e) if !started => {
                error!(cause = %e, "failed to produce response body");
                return send_internal_error(version, conn).await;
            }
            Err(e) => {
                error!(cause = %e, "response body failed while streaming, closing connection");
                conn.set_lifecycle(Lifecycle::Close);
                return Ok(());
            }
        };
        if data.is_empty() {
            continue;
        }
        writer.serializer_mut().append(data);
        writer.send_chunk(conn, false).await?;
        started = true;
    }
    writer.send_final_chunk(conn).await?;
    Ok(())
}

async fn send_internal_error<S>(version: Version, conn: &mut Connection<S>) -> Result<(), SendError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut writer = MessageWriter::new(MessageSerializer::response(StatusLine::with_reason(version, 500)));
    writer.send(conn).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::stream;
    use http_body::Frame;
    use http_body_util::StreamBody;
    use reactor_http::codec::MessageParser;
    use reactor_http::connection::{MessageReader, ReaderConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;
    use crate::auth::MockAuthenticator;
    use crate::service::{BoxError, ResourceRequest, Target};

    #[derive(Default)]
    struct Users {
        fail: bool,
        stream: bool,
        seen: Mutex<Option<ResourceRequest>>,
    }

    impl Service for Users {
        fn parse_request_target(&self, message: &ParsedMessage) -> Result<Target, BoxError> {
            let path = message.path().unwrap_or_default();
            let name = path.strip_prefix("/users/").ok_or("not a user resource")?;
            Ok(Target::new("users", name))
        }

        async fn handle_resource(&self, request: ResourceRequest) -> Result<ResourceResponse, BoxError> {
            *self.seen.lock().unwrap() = Some(request);
            if self.fail {
                return Err("storage is down".into());
            }
            if self.stream {
                let frames = ["alpha ", "beta"].map(|piece| Ok::<_, BoxError>(Frame::data(Bytes::from(piece))));
                return Ok(ResourceResponse::new(200).with_body(ResponseBody::stream(StreamBody::new(stream::iter(frames)))));
            }
            Ok(ResourceResponse::new(200)
                .with_content_type("application/json")
                .with_etag("\"v1\"")
                .with_header("X-Served-By", "users")
                .with_body("{\"name\":\"alice\"}"))
        }

        fn resolve_user(&self, name: &str) -> Option<String> {
            (name == "alice").then(|| "secret".to_string())
        }
    }

    fn allowing(user: &'static str) -> MockAuthenticator {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_authenticate().returning(move |_, _, _| AuthOutcome::Authenticated(user.to_string()));
        authenticator
    }

    async fn exchange<A: Authenticator>(handler: &RequestHandler<Users, A>, request: &[u8]) -> ParsedMessage {
        let (mut client, server) = duplex(64 * 1024);
        let mut conn = Connection::new(server);
        client.write_all(request).await.unwrap();

        let message = MessageReader::request(&ReaderConfig::default()).receive(&mut conn).await.unwrap();
        handler.on_message_complete(message, &mut conn).await;
        drop(conn);

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let mut parser = MessageParser::response(1024 * 1024, "GET");
        assert_eq!(parser.parse(&raw).unwrap(), raw.len());
        parser.into_message()
    }

    #[tokio::test]
    async fn serve_resource() {
        let handler = RequestHandler::new(Users::default(), allowing("alice"));
        let response = exchange(&handler, b"GET /users/alice?full HTTP/1.1\r\nIf-None-Match: \"v0\"\r\n\r\n").await;

        assert_eq!(response.status_code(), Some(200));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("etag"), Some("\"v1\""));
        assert_eq!(response.header("x-served-by"), Some("users"));
        assert_eq!(response.body(), &b"{\"name\":\"alice\"}"[..]);

        let seen = handler.service().seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.target, Target::new("users", "alice"));
        assert_eq!(seen.username.as_deref(), Some("alice"));
        assert_eq!(seen.query, "full");
        assert_eq!(seen.if_none_match, ["\"v0\""]);
    }

    #[tokio::test]
    async fn failed_message_is_bad_request() {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_authenticate().never();
        let handler = RequestHandler::new(Users::default(), authenticator);

        let response = exchange(&handler, b"GET /users/alice HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n").await;
        assert_eq!(response.status_code(), Some(400));
    }

    #[tokio::test]
    async fn method_not_allowed() {
        let handler = RequestHandler::new(Users::default(), allowing("alice"));
        let response = exchange(&handler, b"POST /users/alice HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;

        assert_eq!(response.status_code(), Some(405));
        assert_eq!(response.header("allow"), Some("GET, PUT, DELETE"));
        assert!(handler.service().seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_target_is_bad_request() {
        let handler = RequestHandler::new(Users::default(), allowing("alice"));
        let response = exchange(&handler, b"GET /groups/admins HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status_code(), Some(400));
    }

    #[tokio::test]
    async fn unauthorized_gets_digest_challenge() {
        let nonces = Arc::new(Mutex::new(Vec::new()));
        let registered = Arc::clone(&nonces);

        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .withf(|_, domain, _| domain == "users")
            .returning(|_, _, users| match users.resolve_user("mallory") {
                Some(_) => AuthOutcome::Authenticated("mallory".to_string()),
                None => AuthOutcome::Unauthorized,
            });
        authenticator
            .expect_register_nonce()
            .times(1)
            .returning(move |nonce| registered.lock().unwrap().push(nonce.to_string()));
        let handler = RequestHandler::new(Users::default(), authenticator);

        let response = exchange(&handler, b"GET /users/mallory HTTP/1.1\r\nAuthorization: Digest username=\"mallory\"\r\n\r\n").await;
        assert_eq!(response.status_code(), Some(401));

        let nonce = nonces.lock().unwrap().pop().unwrap();
        Uuid::parse_str(&nonce).unwrap();
        assert_eq!(
            response.header("www-authenticate"),
            Some(format!("Digest qop=\"auth\", realm=\"users\", nonce=\"{nonce}\"").as_str())
        );
    }

    #[tokio::test]
    async fn malformed_credentials() {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_authenticate().returning(|_, _, _| AuthOutcome::BadRequest);
        authenticator.expect_register_nonce().never();
        let handler = RequestHandler::new(Users::default(), authenticator);

        let response = exchange(&handler, b"PUT /users/alice HTTP/1.1\r\nAuthorization: Digest\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(response.status_code(), Some(400));
    }

    #[tokio::test]
    async fn service_error_is_internal_error() {
        let handler = RequestHandler::new(Users { fail: true, ..Users::default() }, allowing("alice"));
        let response = exchange(&handler, b"DELETE /users/alice HTTP/1.1\r\n\r\n").await;

        assert_eq!(response.status_code(), Some(500));
        assert_eq!(response.header("etag"), None);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn stream_is_chunked_on_http11() {
        let handler = RequestHandler::new(Users { stream: true, ..Users::default() }, allowing("alice"));
        let response = exchange(&handler, b"GET /users/alice HTTP/1.1\r\n\r\n").await;

        assert_eq!(response.header("transfer-encoding"), Some("chunked"));
        assert_eq!(response.body(), &b"alpha beta"[..]);
    }

    #[tokio::test]
    async fn stream_is_collected_on_http10() {
        let handler = RequestHandler::new(Users { stream: true, ..Users::default() }, allowing("alice"));
        let response = exchange(&handler, b"GET /users/alice HTTP/1.0\r\n\r\n").await;

        assert_eq!(response.header("transfer-encoding"), None);
        assert_eq!(response.header("content-length"), Some("10"));
        assert_eq!(response.header("connection"), Some("close"));
        assert_eq!(response.body(), &b"alpha beta"[..]);
    }
}

//! A multi reactor HTTP/1.x server on top of [`reactor_http`]
//!
//! The server owns a group of reactors, each a tokio runtime with its own worker threads. All
//! reactors accept from one listening socket; a connection stays on the reactor that accepted
//! it for its whole life. Every parsed request goes to a [`MessageHandler`], usually a
//! [`RequestHandler`] that resolves the target, authenticates the user and calls a [`Service`].
//!
//! # Example
//!
//! ```no_run
//! use reactor_http::protocol::ParsedMessage;
//! use reactor_server::{AllowAll, BoxError, ResourceRequest, ResourceResponse, Server, ServerConfig, Service, Target};
//!
//! struct Hello;
//!
//! impl Service for Hello {
//!     fn parse_request_target(&self, message: &ParsedMessage) -> Result<Target, BoxError> {
//!         Ok(Target::new("hello", message.path().unwrap_or("/")))
//!     }
//!
//!     async fn handle_resource(&self, request: ResourceRequest) -> Result<ResourceResponse, BoxError> {
//!         Ok(ResourceResponse::new(200).with_content_type("text/plain").with_body(format!("hello {}", request.target.resource)))
//!     }
//!
//!     fn resolve_user(&self, _name: &str) -> Option<String> {
//!         None
//!     }
//! }
//!
//! let server = Server::with_service(ServerConfig::default(), Hello, AllowAll).unwrap();
//! server.start().unwrap();
//! server.join();
//! ```
//!
//! [`MessageHandler`]: reactor_http::handler::MessageHandler

mod auth;
mod config;
mod dispatch;
mod error;
mod reactor;
mod server;
mod service;
mod tls;

pub use auth::{ANONYMOUS, AllowAll, AuthOutcome, Authenticator, UserResolver};
pub use config::{DEFAULT_ADDRESS, ServerConfig, TlsConfig};
pub use dispatch::RequestHandler;
pub use error::ServerError;
pub use reactor::{Reactor, ReactorGroup};
pub use server::{DRAIN_POLL_INTERVAL, Server, ServerBuilder};
pub use service::{BoxError, LocalService, ResourceRequest, ResourceResponse, ResponseBody, Service, Target};
pub use tls::{Transport, load_acceptor};

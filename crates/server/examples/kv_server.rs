//! An in-memory document store answering `GET`, `PUT` and `DELETE` under `/docs/<name>`.
//!
//! Run with an optional JSON config file:
//!
//! ```text
//! cargo run -p reactor-server --example kv_server -- server.json
//! curl -i -X PUT --data 'hello' localhost:8080/docs/greeting
//! curl -i localhost:8080/docs/greeting
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use reactor_http::protocol::ParsedMessage;
use reactor_server::{AllowAll, BoxError, ResourceRequest, ResourceResponse, Server, ServerConfig, Service, Target};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Default)]
struct Documents {
    docs: Mutex<HashMap<String, (u64, Bytes, Option<String>)>>,
}

impl Documents {
    fn etag(version: u64) -> String {
        format!("\"{version}\"")
    }
}

impl Service for Documents {
    fn parse_request_target(&self, message: &ParsedMessage) -> Result<Target, BoxError> {
        let name = message.path().and_then(|path| path.strip_prefix("/docs/")).ok_or("unknown collection")?;
        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid document name {name:?}").into());
        }
        Ok(Target::new("docs", name))
    }

    async fn handle_resource(&self, request: ResourceRequest) -> Result<ResourceResponse, BoxError> {
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        let current = docs.get(&request.target.resource).map(|(version, _, _)| Self::etag(*version));

        if !request.if_match.is_empty()
            && !request.if_match.iter().any(|tag| tag == "*" || Some(tag) == current.as_ref())
        {
            return Ok(ResourceResponse::new(412));
        }

        let response = match request.method.as_str() {
            "GET" => match docs.get(&request.target.resource) {
                Some((version, body, content_type)) => {
                    let response = ResourceResponse::new(200).with_etag(Self::etag(*version)).with_body(body.clone());
                    match content_type {
                        Some(content_type) => response.with_content_type(content_type.clone()),
                        None => response,
                    }
                }
                None => ResourceResponse::new(404),
            },
            "PUT" => {
                let version = docs.get(&request.target.resource).map_or(1, |(version, _, _)| version + 1);
                let status = if version == 1 { 201 } else { 200 };
                docs.insert(request.target.resource, (version, request.body, request.content_type));
                ResourceResponse::new(status).with_etag(Self::etag(version))
            }
            "DELETE" => match docs.remove(&request.target.resource) {
                Some(_) => ResourceResponse::new(200),
                None => ResourceResponse::new(404),
            },
            method => return Err(format!("unexpected method {method}").into()),
        };
        Ok(response)
    }

    fn resolve_user(&self, _name: &str) -> Option<String> {
        None
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ServerConfig::default(),
    };

    let server = Arc::new(Server::with_service(config, Documents::default(), AllowAll)?);
    server.start()?;

    let stopper = Arc::clone(&server);
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
        if let Ok(runtime) = runtime {
            let _ = runtime.block_on(tokio::signal::ctrl_c());
        }
        info!("shutting down");
        stopper.stop(true);
    });

    server.join();
    Ok(())
}

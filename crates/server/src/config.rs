use std::path::PathBuf;
use std::time::Duration;

use reactor_http::connection::{DEFAULT_MAX_BODY_SIZE, DEFAULT_READ_TIMEOUT, ReaderConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// Everything a [`Server`](crate::Server) needs, built once at startup.
///
/// Deserializes from any serde format. Missing fields take their default, and the read timeout
/// is given in whole seconds with `0` meaning no timeout:
///
/// ```
/// use reactor_server::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{ "address": "0.0.0.0:80", "read_timeout": 10 }"#).unwrap();
/// assert_eq!(config.reactors, 1);
/// assert_eq!(config.read_timeout.as_secs(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub reactors: usize,
    pub threads_per_reactor: usize,
    pub max_body_size: usize,
    #[serde(with = "seconds")]
    pub read_timeout: Duration,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            reactors: 1,
            threads_per_reactor: 1,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// The settings handed to every `MessageReader` of the server.
    pub fn reader_config(&self) -> ReaderConfig {
        let read_timeout = if self.read_timeout.is_zero() { None } else { Some(self.read_timeout) };
        ReaderConfig { max_body_size: self.max_body_size, read_timeout }
    }
}

/// PEM files for serving over TLS.
///
/// Without `key_path` the private key is read from the certificate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    pub fn new<P: Into<PathBuf>>(cert_path: P) -> Self {
        Self { cert_path: cert_path.into(), key_path: None }
    }

    pub fn with_key<P: Into<PathBuf>>(mut self, key_path: P) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn key_path(&self) -> &PathBuf {
        self.key_path.as_ref().unwrap_or(&self.cert_path)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

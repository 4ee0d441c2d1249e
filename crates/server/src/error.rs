use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("failed to build reactor runtime: {source}")]
    Runtime { source: io::Error },

    #[error("invalid tls material in {path:?}: {reason}")]
    Tls { path: PathBuf, reason: String },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServerError {
    pub fn bind<S: ToString>(address: S, source: io::Error) -> Self {
        Self::Bind { address: address.to_string(), source }
    }

    pub fn tls<P: AsRef<Path>, S: ToString>(path: P, reason: S) -> Self {
        Self::Tls { path: path.as_ref().to_path_buf(), reason: reason.to_string() }
    }
}

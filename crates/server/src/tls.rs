use std::fs::File;
use std::io::{self, BufReader, IoSlice};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::config::TlsConfig;
use crate::error::ServerError;

/// Builds the acceptor used to wrap every accepted socket, using the ring crypto provider.
pub fn load_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(config.key_path())?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls(&config.cert_path, e))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(&config.cert_path, e))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| ServerError::tls(path, e))?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(path, e))?;

    if certs.is_empty() {
        return Err(ServerError::tls(path, "no certificate found"));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| ServerError::tls(path, e))?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::tls(path, e))?
        .ok_or_else(|| ServerError::tls(path, "no private key found"))
}

/// An accepted socket, with or without TLS on top.
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(self: Pin<&mut Self>, cx: &mut Context<'_>, bufs: &[IoSlice<'_>]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Transport::Plain(stream) => stream.is_write_vectored(),
            Transport::Tls(stream) => stream.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("reactor-server-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_certificate_file() {
        let config = TlsConfig::new("/nonexistent/reactor-server/cert.pem");
        let error = load_acceptor(&config).err().unwrap();
        assert!(matches!(error, ServerError::Tls { ref path, .. } if path == &config.cert_path));
    }

    #[test]
    fn file_without_certificate() {
        let path = temp_file("empty.pem", "not a pem file\n");
        let error = load_acceptor(&TlsConfig::new(&path)).err().unwrap();
        assert!(error.to_string().contains("no certificate found"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn certificate_without_key() {
        // a syntactically valid PEM block is enough, the key lookup fails before rustls sees it
        let cert = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let cert_path = temp_file("cert-only.pem", cert);
        let key_path = temp_file("no-key.pem", "\n");

        let error = load_acceptor(&TlsConfig::new(&cert_path).with_key(&key_path)).err().unwrap();
        assert!(matches!(error, ServerError::Tls { ref path, ref reason } if path == &key_path && reason.contains("no private key")));

        std::fs::remove_file(cert_path).unwrap();
        std::fs::remove_file(key_path).unwrap();
    }
}

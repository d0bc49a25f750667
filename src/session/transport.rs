//! Transport seam between a session and the network.
//!
//! Sessions open connections through a [`Connector`], so tests can swap the
//! network for in-memory streams. [`TcpConnector`] is the production
//! implementation: plain TCP, or TLS via rustls with the webpki root store
//! when the credentials ask for a secure transport.

use std::{io, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, crypto::ring, pki_types::ServerName},
};
use tracing::debug;

use crate::credentials::ConnectOptions;

/// Byte stream carrying one backend connection.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens transports for sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be established.
    async fn connect(&self, options: &ConnectOptions) -> io::Result<Box<dyn Transport>>;
}

/// Connector dialing TCP, with TLS when `options.secure` is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

fn tls_config() -> io::Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, options: &ConnectOptions) -> io::Result<Box<dyn Transport>> {
        debug!(
            host = %options.host,
            port = options.port,
            secure = options.secure,
            "opening connection"
        );
        let stream = TcpStream::connect((options.host.as_str(), options.port)).await?;
        stream.set_nodelay(true)?;
        if !options.secure {
            return Ok(Box::new(stream));
        }
        let server_name = ServerName::try_from(options.host.clone())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let stream = TlsConnector::from(tls_config()?)
            .connect(server_name, stream)
            .await?;
        Ok(Box::new(stream))
    }
}

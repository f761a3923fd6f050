//! TCP and TLS connection establishment for IRC sessions.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::debug;

use crate::irc::IrcError;

/// Default IRC port when connecting over TLS.
pub const DEFAULT_TLS_PORT: u16 = 6697;

/// Default IRC port for plain TCP.
pub const DEFAULT_PLAIN_PORT: u16 = 6667;

/// Upper bound on TCP connect plus TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a session negotiates its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS with certificate verification.
    VerifiedTls,
    /// TLS with certificate verification bypassed.
    InsecureTls,
    /// Plain TCP, no TLS.
    Plain,
}

impl TlsMode {
    /// Whether this mode performs a TLS handshake at all.
    #[must_use]
    pub fn uses_tls(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Byte stream over either a plain or a TLS transport.
pub trait IrcStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> IrcStream for T {}

/// Resolves `network` to a `host:port` address, applying the default IRC
/// port for the mode when the input carries none.
#[must_use]
pub fn server_address(network: &str, mode: TlsMode) -> String {
    if network.contains(':') {
        return network.to_string();
    }
    let port = if mode.uses_tls() {
        DEFAULT_TLS_PORT
    } else {
        DEFAULT_PLAIN_PORT
    };
    format!("{network}:{port}")
}

/// Establishes a connection to `network` using the given mode.
///
/// The TLS server name is the network host; certificate verification is
/// skipped only in [`TlsMode::InsecureTls`].
///
/// # Errors
///
/// [`IrcError::Connect`] when the TCP dial fails or times out,
/// [`IrcError::Tls`] when the TLS handshake fails.
pub async fn establish(network: &str, mode: TlsMode) -> Result<Box<dyn IrcStream>, IrcError> {
    let addr = server_address(network, mode);
    let host = network.split(':').next().unwrap_or(network).to_string();

    debug!(%addr, ?mode, "connecting to IRC server");

    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| IrcError::connect(&addr, std::io::ErrorKind::TimedOut.into()))?
        .map_err(|e| IrcError::connect(&addr, e))?;

    if !mode.uses_tls() {
        return Ok(Box::new(stream));
    }

    let mut builder = native_tls::TlsConnector::builder();
    if mode == TlsMode::InsecureTls {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let connector = TlsConnector::from(builder.build().map_err(IrcError::Tls)?);

    let tls_stream = timeout(CONNECT_TIMEOUT, connector.connect(&host, stream))
        .await
        .map_err(|_| IrcError::connect(&addr, std::io::ErrorKind::TimedOut.into()))?
        .map_err(IrcError::Tls)?;

    debug!(%addr, "TLS handshake complete");
    Ok(Box::new(tls_stream))
}

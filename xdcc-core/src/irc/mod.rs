//! Wire-level IRC client: line codec, connection establishment, and the
//! actor-style session task.

mod connection;
mod message;
mod session;

pub use connection::{server_address, TlsMode, DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT};
pub use message::Message;
pub use session::{random_nick, IrcConfig, IrcEvent, IrcSession, IRC_USER_NAME};

use thiserror::Error;

/// Errors from the IRC layer.
#[derive(Debug, Error)]
pub enum IrcError {
    /// TCP connect to the server failed or timed out.
    #[error("unable to connect to {addr}: {source}")]
    Connect {
        /// The `host:port` that was dialed.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS negotiation failed. Surfaced verbatim so callers can recognize
    /// certificate-authority problems and hint at the bypass flag.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The server sent a line we could not make sense of.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Reading from or writing to the connection failed.
    #[error("connection I/O error: {0}")]
    Io(std::io::Error),

    /// The session task has terminated; the handle is stale.
    #[error("IRC session closed")]
    SessionClosed,
}

impl IrcError {
    pub(crate) fn connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Heuristic for certificate-authority failures inside [`IrcError::Tls`].
    ///
    /// native-tls does not expose a typed unknown-CA error, so this matches
    /// the error text across the platform backends.
    #[must_use]
    pub fn is_certificate_error(&self) -> bool {
        match self {
            Self::Tls(e) => {
                let text = e.to_string().to_lowercase();
                text.contains("certificate") || text.contains("unknown issuer")
            }
            _ => false,
        }
    }
}

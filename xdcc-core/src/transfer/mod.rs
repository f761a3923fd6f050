//! XDCC transfer engine, supervision, and scheduling.

mod engine;
mod events;
mod manager;
mod speed;
mod supervisor;

pub use engine::{sanitize_file_name, DriveOutcome, XdccTransfer, DOWNLOAD_BUF_SIZE};
pub use events::{EventBus, TransferEvent, TransferState, EVENT_QUEUE_SIZE};
pub use manager::TransferManager;
pub use speed::SpeedMonitor;
pub use supervisor::{SupervisedTransfer, TlsPolicy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::ctcp::CtcpError;
use crate::irc::IrcError;
use crate::locator::FileLocator;

/// Everything needed to run one transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// The file slot to request.
    pub locator: FileLocator,
    /// Directory the file is written into.
    pub out_dir: PathBuf,
    /// TLS negotiation policy.
    pub tls: TlsPolicy,
}

/// Fatal transfer errors; each one surfaces as an `Aborted` event.
#[derive(Debug, Error)]
pub enum TransferError {
    /// IRC connection or session failure.
    #[error(transparent)]
    Irc(#[from] IrcError),

    /// The CTCP payload could not be used.
    #[error(transparent)]
    Ctcp(#[from] CtcpError),

    /// TCP dial to the DCC peer failed.
    #[error("dial failed: {addr}")]
    DialFailed {
        /// The peer address from the offer.
        addr: SocketAddr,
    },

    /// File or socket I/O failed mid-download.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the stream before delivering all advertised bytes.
    #[error("short read: got {received} of {expected} bytes")]
    ShortRead { received: u64, expected: u64 },

    /// The data socket made no progress for too long.
    #[error("data stream stalled for {seconds}s")]
    Stalled { seconds: u64 },

    /// The offered file name is not a safe bare basename.
    #[error("unsafe file name in offer: {file_name:?}")]
    UnsafeFileName { file_name: String },

    /// The transfer was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The IRC session kept dropping before the download started.
    #[error("reconnect attempts exhausted after {attempts}: {reason}")]
    ReconnectExhausted { attempts: u32, reason: String },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the underlying failure is a TLS certificate problem,
    /// actionable via the verification bypass.
    #[must_use]
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, Self::Irc(e) if e.is_certificate_error())
    }
}

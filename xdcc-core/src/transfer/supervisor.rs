//! Transfer supervision: TLS negotiation fallback and reconnect policy.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::irc::TlsMode;
use crate::transfer::engine::{DriveOutcome, XdccTransfer};
use crate::transfer::events::{EventBus, TransferEvent};
use crate::transfer::{TransferConfig, TransferError};

/// Maximum IRC reconnects before the download starts.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Pause between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How the connection may be negotiated.
///
/// With no flags set, three modes are attempted in order: TLS with
/// certificate verification, TLS with verification bypassed, then plain TCP.
/// `ssl_only` removes the plain fallback, `no_ssl` removes TLS entirely, and
/// `allow_unknown_authority` makes every TLS attempt skip verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Never fall back to plain TCP.
    pub ssl_only: bool,
    /// Never use TLS.
    pub no_ssl: bool,
    /// Do not verify server certificates.
    pub allow_unknown_authority: bool,
}

impl TlsPolicy {
    /// The ordered connection modes this policy permits.
    #[must_use]
    pub fn negotiation_order(self) -> Vec<TlsMode> {
        if self.ssl_only {
            if self.allow_unknown_authority {
                return vec![TlsMode::InsecureTls];
            }
            return vec![TlsMode::VerifiedTls];
        }
        if self.no_ssl {
            return vec![TlsMode::Plain];
        }
        if self.allow_unknown_authority {
            return vec![TlsMode::InsecureTls, TlsMode::Plain];
        }
        vec![TlsMode::VerifiedTls, TlsMode::InsecureTls, TlsMode::Plain]
    }
}

/// A transfer wrapped with connection fallback and reconnect handling.
///
/// The first negotiation mode whose connect succeeds is kept for the
/// lifetime of the transfer. If the IRC session then drops before the
/// download starts, up to [`MAX_RECONNECT_ATTEMPTS`] reconnects are made one
/// second apart, the counter resetting on every completed registration.
pub struct SupervisedTransfer {
    config: TransferConfig,
    bus: EventBus,
    events: Option<mpsc::Receiver<TransferEvent>>,
    cancel: CancellationToken,
}

impl SupervisedTransfer {
    #[must_use]
    pub fn new(config: TransferConfig) -> Self {
        let (bus, events) = EventBus::new();
        Self {
            config,
            bus,
            events: Some(events),
            cancel: CancellationToken::new(),
        }
    }

    /// The consumer end of the event queue. Yields `None` after the first
    /// call; exactly one consumer is expected per transfer.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events.take()
    }

    /// Token that aborts the transfer when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Negotiates a connection and spawns the supervision task.
    ///
    /// Returns once a connection mode has succeeded; everything after that
    /// is observable through the event queue.
    ///
    /// # Errors
    ///
    /// The error of the last attempted mode when every permitted mode fails.
    pub async fn start(&mut self) -> Result<(), TransferError> {
        let mut last_error: Option<TransferError> = None;

        for mode in self.config.tls.negotiation_order() {
            let mut engine = XdccTransfer::new(
                self.config.clone(),
                mode,
                self.bus.clone(),
                self.cancel.clone(),
            );
            match engine.connect().await {
                Ok(()) => {
                    info!(?mode, locator = %self.config.locator, "connection negotiated");
                    tokio::spawn(supervise(engine));
                    return Ok(());
                }
                Err(e) => {
                    warn!(?mode, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(TransferError::Irc(
            crate::irc::IrcError::SessionClosed,
        )))
    }
}

/// Drives the engine to a terminal event, reconnecting on pre-start drops.
async fn supervise(mut engine: XdccTransfer) {
    let mut attempts: u32 = 0;

    loop {
        match engine.drive().await {
            DriveOutcome::Terminal => return,
            DriveOutcome::Disconnected { reason, registered } => {
                if registered {
                    attempts = 0;
                }
                attempts += 1;
                if attempts > MAX_RECONNECT_ATTEMPTS {
                    engine
                        .abort(TransferError::ReconnectExhausted {
                            attempts: MAX_RECONNECT_ATTEMPTS,
                            reason,
                        })
                        .await;
                    return;
                }

                info!(attempts, %reason, "IRC session dropped, reconnecting");
                sleep(RECONNECT_DELAY).await;
                if let Err(e) = engine.connect().await {
                    engine.abort(e).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_tries_all_three_modes() {
        assert_eq!(
            TlsPolicy::default().negotiation_order(),
            vec![TlsMode::VerifiedTls, TlsMode::InsecureTls, TlsMode::Plain]
        );
    }

    #[test]
    fn test_ssl_only_forces_verified_tls() {
        let policy = TlsPolicy {
            ssl_only: true,
            ..TlsPolicy::default()
        };
        assert_eq!(policy.negotiation_order(), vec![TlsMode::VerifiedTls]);
    }

    #[test]
    fn test_ssl_only_with_unknown_authority_skips_verification() {
        let policy = TlsPolicy {
            ssl_only: true,
            allow_unknown_authority: true,
            ..TlsPolicy::default()
        };
        assert_eq!(policy.negotiation_order(), vec![TlsMode::InsecureTls]);
    }

    #[test]
    fn test_no_ssl_forces_plain() {
        let policy = TlsPolicy {
            no_ssl: true,
            ..TlsPolicy::default()
        };
        assert_eq!(policy.negotiation_order(), vec![TlsMode::Plain]);
    }

    #[test]
    fn test_unknown_authority_downgrades_verified_attempt() {
        let policy = TlsPolicy {
            allow_unknown_authority: true,
            ..TlsPolicy::default()
        };
        assert_eq!(
            policy.negotiation_order(),
            vec![TlsMode::InsecureTls, TlsMode::Plain]
        );
    }
}

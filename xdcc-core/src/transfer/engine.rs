//! The transfer engine: one IRC session, one state machine, one DCC stream.
//!
//! The engine connects, joins the target channel, requests the slot, and
//! turns the resulting DCC SEND offer into a streaming download on its own
//! task. Everything observable happens on the event bus.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ctcp::{CtcpMessage, DccOffer, SendRequest};
use crate::irc::{random_nick, IrcConfig, IrcEvent, IrcSession, TlsMode};
use crate::transfer::events::{EventBus, TransferEvent, TransferState};
use crate::transfer::speed::SpeedMonitor;
use crate::transfer::{TransferConfig, TransferError};

/// Read buffer size for the DCC data stream.
pub const DOWNLOAD_BUF_SIZE: usize = 1024;

/// A data-socket read that makes no progress for this long aborts.
const READ_WATCHDOG: Duration = Duration::from_secs(60);

/// Why [`XdccTransfer::drive`] returned.
#[derive(Debug)]
pub enum DriveOutcome {
    /// A terminal event was published; the transfer is over.
    Terminal,
    /// The IRC session dropped before the download started.
    Disconnected {
        /// Human-readable cause.
        reason: String,
        /// Whether registration (CONNECTED) succeeded during this run.
        registered: bool,
    },
}

/// A single XDCC transfer bound to one negotiated connection mode.
pub struct XdccTransfer {
    config: TransferConfig,
    mode: TlsMode,
    bus: EventBus,
    cancel: CancellationToken,
    state: Arc<Mutex<TransferState>>,
    started: Arc<AtomicBool>,
    session: Option<IrcSession>,
    irc_events: Option<mpsc::Receiver<IrcEvent>>,
    send_dispatched: bool,
}

impl XdccTransfer {
    #[must_use]
    pub fn new(
        config: TransferConfig,
        mode: TlsMode,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            mode,
            bus,
            cancel,
            state: Arc::new(Mutex::new(TransferState::Idle)),
            started: Arc::new(AtomicBool::new(false)),
            session: None,
            irc_events: None,
            send_dispatched: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether `Started` has been emitted.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The negotiated connection mode.
    #[must_use]
    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    /// Establishes (or re-establishes) the IRC session.
    ///
    /// A fresh connection means any previously dispatched slot request died
    /// with the old session, so the request is re-armed.
    ///
    /// # Errors
    ///
    /// Connection or TLS errors from the IRC layer.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.set_state(TransferState::Connecting);
        let irc_config = IrcConfig {
            network: self.config.locator.network.clone(),
            mode: self.mode,
            nick: random_nick(),
        };
        let (session, events) = IrcSession::connect(irc_config).await?;
        self.session = Some(session);
        self.irc_events = Some(events);
        self.send_dispatched = false;
        Ok(())
    }

    /// Runs the protocol until a terminal event or a pre-start disconnect.
    ///
    /// Post-start disconnects are absorbed: once the DCC stream is running
    /// the IRC session has no further role, and the download task decides
    /// the terminal event.
    pub async fn drive(&mut self) -> DriveOutcome {
        let Some(mut events) = self.irc_events.take() else {
            return DriveOutcome::Disconnected {
                reason: "no active session".to_string(),
                registered: false,
            };
        };

        let mut registered = false;

        // IRC phase: join, request, wait for the offer.
        let download = loop {
            match events.recv().await {
                None => {
                    return DriveOutcome::Disconnected {
                        reason: "session task ended".to_string(),
                        registered,
                    };
                }
                Some(IrcEvent::Connected) => {
                    registered = true;
                    info!(network = %self.config.locator.network, "connected, joining channel");
                    if let Some(session) = &self.session {
                        if session.join(&self.config.locator.channel).await.is_err() {
                            return DriveOutcome::Disconnected {
                                reason: "session closed during join".to_string(),
                                registered,
                            };
                        }
                    }
                }
                Some(IrcEvent::Joined { channel }) => {
                    if let Err(outcome) = self.on_joined(&channel, registered).await {
                        return outcome;
                    }
                }
                Some(IrcEvent::Ctcp { from, payload }) => {
                    match self.on_ctcp(&from, &payload).await {
                        Ok(Some(handle)) => break handle,
                        Ok(None) => {}
                        Err(e) => {
                            self.abort(e).await;
                            return DriveOutcome::Terminal;
                        }
                    }
                }
                Some(IrcEvent::Privmsg { from, text }) => {
                    debug!(%from, %text, "ignoring private message");
                }
                Some(IrcEvent::Error { message }) => {
                    warn!(%message, "server error");
                }
                Some(IrcEvent::Disconnected { reason }) => {
                    return DriveOutcome::Disconnected { reason, registered };
                }
            }
        };

        // Download phase: the IRC session only idles; wait for the stream.
        self.await_download(download, events).await
    }

    /// Publishes `Aborted` and moves to the terminal state.
    pub async fn abort(&self, error: TransferError) {
        warn!(error = %error, locator = %self.config.locator, "transfer aborted");
        self.set_state(TransferState::Aborted);
        self.bus
            .lifecycle(TransferEvent::Aborted {
                reason: error.to_string(),
            })
            .await;
    }

    async fn on_joined(
        &mut self,
        channel: &str,
        registered: bool,
    ) -> Result<(), DriveOutcome> {
        if !channel.eq_ignore_ascii_case(&self.config.locator.channel) {
            return Ok(());
        }
        self.set_state(TransferState::Joined);
        // A repeated JOIN must not re-request the slot.
        if self.send_dispatched || self.started() {
            return Ok(());
        }
        let request = SendRequest {
            slot: self.config.locator.slot,
        };
        info!(bot = %self.config.locator.user_name, %request, "requesting slot");
        if let Some(session) = &self.session {
            if session
                .privmsg(&self.config.locator.user_name, &request.to_string())
                .await
                .is_err()
            {
                return Err(DriveOutcome::Disconnected {
                    reason: "session closed during request".to_string(),
                    registered,
                });
            }
        }
        self.send_dispatched = true;
        self.set_state(TransferState::AwaitingOffer);
        Ok(())
    }

    async fn on_ctcp(
        &mut self,
        from: &str,
        payload: &str,
    ) -> Result<Option<JoinHandle<()>>, TransferError> {
        match CtcpMessage::parse(payload)? {
            CtcpMessage::Version => {
                debug!(%from, "CTCP VERSION probe ignored");
                Ok(None)
            }
            CtcpMessage::Send(offer) => {
                info!(
                    %from,
                    file = %offer.file_name,
                    size = offer.file_size,
                    peer = %offer.peer_ip,
                    port = offer.peer_port,
                    "received DCC SEND offer"
                );
                Ok(Some(self.spawn_download(offer)))
            }
        }
    }

    fn spawn_download(&self, offer: DccOffer) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);
        let started = Arc::clone(&self.started);
        let out_dir = self.config.out_dir.clone();

        tokio::spawn(async move {
            let result = download(&offer, &out_dir, &bus, &cancel, &state, &started).await;
            match result {
                Ok(()) => {
                    set_state(&state, TransferState::Completed);
                    bus.lifecycle(TransferEvent::Completed).await;
                }
                Err(e) => {
                    warn!(error = %e, file = %offer.file_name, "download failed");
                    set_state(&state, TransferState::Aborted);
                    bus.lifecycle(TransferEvent::Aborted {
                        reason: e.to_string(),
                    })
                    .await;
                }
            }
        })
    }

    async fn await_download(
        &mut self,
        mut download: JoinHandle<()>,
        mut events: mpsc::Receiver<IrcEvent>,
    ) -> DriveOutcome {
        loop {
            tokio::select! {
                _ = &mut download => {
                    if let Some(session) = self.session.take() {
                        session.quit().await;
                    }
                    return DriveOutcome::Terminal;
                }
                event = events.recv() => {
                    match event {
                        // The session is gone but the stream is independent.
                        None | Some(IrcEvent::Disconnected { .. }) => {
                            let _ = download.await;
                            return DriveOutcome::Terminal;
                        }
                        Some(other) => {
                            debug!(?other, "IRC event during download ignored");
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, state: TransferState) {
        set_state(&self.state, state);
    }
}

fn set_state(slot: &Mutex<TransferState>, state: TransferState) {
    let mut guard = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    debug!(from = ?*guard, to = ?state, "transfer state");
    *guard = state;
}

/// Reduces an offered file name to a safe bare basename.
///
/// The name is untrusted peer input. Anything carrying a path separator, a
/// relative-path dot component, or a NUL is rejected outright rather than
/// repaired.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return None;
    }
    Some(name.to_string())
}

async fn download(
    offer: &DccOffer,
    out_dir: &Path,
    bus: &EventBus,
    cancel: &CancellationToken,
    state: &Arc<Mutex<TransferState>>,
    started: &Arc<AtomicBool>,
) -> Result<(), TransferError> {
    let file_name = sanitize_file_name(&offer.file_name).ok_or_else(|| {
        TransferError::UnsafeFileName {
            file_name: offer.file_name.clone(),
        }
    })?;

    // An empty offer has nothing to stream; the data socket stays closed.
    if offer.file_size == 0 {
        bus.lifecycle(TransferEvent::Started {
            file_name,
            file_size: 0,
        })
        .await;
        started.store(true, Ordering::SeqCst);
        return Ok(());
    }

    let addr = SocketAddr::from((offer.peer_ip, offer.peer_port));
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|_| TransferError::DialFailed { addr })?;

    let path = out_dir.join(&file_name);
    let mut options = tokio::fs::OpenOptions::new();
    options.append(true).create(true).write(true);
    #[cfg(unix)]
    options.mode(0o644);
    let file = options
        .open(&path)
        .await
        .map_err(|e| TransferError::io(&path, e))?;
    let mut writer = BufWriter::new(file);

    bus.lifecycle(TransferEvent::Started {
        file_name: file_name.clone(),
        file_size: offer.file_size,
    })
    .await;
    started.store(true, Ordering::SeqCst);
    set_state(state, TransferState::Downloading);

    let progress_bus = bus.clone();
    let mut monitor = SpeedMonitor::new(stream, move |bytes, rate| {
        progress_bus.progress(bytes, rate);
    });

    let mut buf = [0u8; DOWNLOAD_BUF_SIZE];
    let mut total: u64 = 0;
    while total < offer.file_size {
        let remaining = usize::try_from(offer.file_size - total)
            .unwrap_or(DOWNLOAD_BUF_SIZE)
            .min(DOWNLOAD_BUF_SIZE);

        let read = tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            read = timeout(READ_WATCHDOG, monitor.read(&mut buf[..remaining])) => read,
        };

        let n = match read {
            Err(_) => {
                return Err(TransferError::Stalled {
                    seconds: READ_WATCHDOG.as_secs(),
                })
            }
            Ok(Ok(0)) => {
                return Err(TransferError::ShortRead {
                    received: total,
                    expected: offer.file_size,
                })
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(TransferError::io(&path, e)),
        };

        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        total += n as u64;
    }

    writer.flush().await.map_err(|e| TransferError::io(&path, e))?;
    info!(file = %file_name, bytes = total, "download complete");
    Ok(())
}

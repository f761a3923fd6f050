//! Transfer events and the bounded event bus.

use tokio::sync::mpsc;
use tracing::trace;

/// Capacity of a transfer's event queue.
pub const EVENT_QUEUE_SIZE: usize = 1024;

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Connecting,
    Joined,
    AwaitingOffer,
    Downloading,
    Completed,
    Aborted,
}

impl TransferState {
    /// Whether the transfer has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Events published over a transfer's lifetime.
///
/// `Started` strictly precedes every `Progress`; `Completed` and `Aborted`
/// are terminal, mutually exclusive, and emitted at most once. After a
/// terminal event no further events appear.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The DCC data connection is open and the output file is ready.
    Started {
        file_name: String,
        file_size: u64,
    },
    /// Periodic progress from the speed monitor.
    Progress {
        /// Bytes transferred since the previous progress report.
        transferred_bytes: u64,
        /// Measured throughput in bytes per second.
        transfer_rate: f64,
    },
    /// All advertised bytes are on disk.
    Completed,
    /// The transfer ended without completing.
    Aborted { reason: String },
}

impl TransferEvent {
    fn is_progress(&self) -> bool {
        matches!(self, Self::Progress { .. })
    }
}

/// Bounded multi-producer single-consumer event queue.
///
/// `Progress` events are published without blocking and dropped when the
/// queue is full; lifecycle events are always delivered, waiting for queue
/// space if they must. Only the dedicated download task publishes with
/// back-pressure, so the IRC read loop is never blocked.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<TransferEvent>,
}

impl EventBus {
    /// Creates the bus and its consumer end.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        (Self { tx }, rx)
    }

    /// Publishes a `Progress` event, dropping it if the queue is full.
    pub fn progress(&self, transferred_bytes: u64, transfer_rate: f64) {
        let event = TransferEvent::Progress {
            transferred_bytes,
            transfer_rate,
        };
        if self.tx.try_send(event).is_err() {
            trace!("event queue full, dropping progress event");
        }
    }

    /// Publishes a lifecycle event, waiting for queue space if necessary.
    ///
    /// A dropped consumer is not an error; the event is discarded.
    pub async fn lifecycle(&self, event: TransferEvent) {
        debug_assert!(!event.is_progress(), "progress events go through progress()");
        let _ = self.tx.send(event).await;
    }
}

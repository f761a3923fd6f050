//! Throughput-measuring reader adapter.
//!
//! Wraps a byte stream and accounts for every read: bytes received and the
//! wall-clock time spent blocked inside the read. Once more than one second
//! of read time has accumulated, the observer is called with the byte count
//! and the derived rate, and both accumulators restart from zero. Time
//! between reads deliberately does not count.

use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};

/// Accumulated read time that triggers an observer update.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Observer invoked with (bytes since last report, bytes per second).
pub type OnUpdate = Box<dyn FnMut(u64, f64) + Send>;

/// Byte-stream adapter measuring throughput over a sliding interval.
pub struct SpeedMonitor<R> {
    inner: R,
    accumulated_bytes: u64,
    accumulated_time: Duration,
    on_update: OnUpdate,
}

impl<R: AsyncRead + Unpin> SpeedMonitor<R> {
    pub fn new(inner: R, on_update: impl FnMut(u64, f64) + Send + 'static) -> Self {
        Self {
            inner,
            accumulated_bytes: 0,
            accumulated_time: Duration::ZERO,
            on_update: Box::new(on_update),
        }
    }

    /// Reads from the underlying stream, accounting bytes and blocked time.
    ///
    /// # Errors
    ///
    /// Propagates the underlying read error verbatim, flushing any pending
    /// accumulation to the observer first.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let started = Instant::now();
        let result = self.inner.read(buf).await;
        self.accumulated_time += started.elapsed();

        match result {
            Ok(n) => {
                self.accumulated_bytes += n as u64;
                if self.accumulated_time > REPORT_INTERVAL {
                    self.flush();
                }
                Ok(n)
            }
            Err(e) => {
                self.flush();
                Err(e)
            }
        }
    }

    fn flush(&mut self) {
        if self.accumulated_bytes > 0 && !self.accumulated_time.is_zero() {
            let rate = self.accumulated_bytes as f64 / self.accumulated_time.as_secs_f64();
            (self.on_update)(self.accumulated_bytes, rate);
        }
        self.accumulated_bytes = 0;
        self.accumulated_time = Duration::ZERO;
    }
}

//! Per-transfer progress bars under one shared multi-bar renderer.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::output::cut_str;

/// Longest file name shown before truncation.
const MAX_FILE_NAME_WIDTH: usize = 35;

const TICK_INTERVAL: Duration = Duration::from_millis(180);

/// Rendering states of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Connecting,
    Downloading,
    Done,
    Aborted,
}

impl ProgressState {
    fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

/// One transfer's bar inside the shared [`MultiProgress`].
pub struct TransferProgressBar {
    bar: ProgressBar,
}

impl TransferProgressBar {
    pub fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template(
                "{prefix} {msg:>11} [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(TICK_INTERVAL);
        bar.set_message(ProgressState::Connecting.label());
        Self { bar }
    }

    pub fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    pub fn set_file_name(&self, file_name: &str) {
        self.bar
            .set_prefix(format!("{}:", cut_str(file_name, MAX_FILE_NAME_WIDTH)));
    }

    pub fn set_state(&self, state: ProgressState) {
        self.bar.set_message(state.label());
        match state {
            ProgressState::Done => self.bar.finish(),
            ProgressState::Aborted => self.bar.abandon(),
            ProgressState::Connecting | ProgressState::Downloading => {}
        }
    }

    pub fn increment(&self, bytes: u64) {
        self.bar.inc(bytes);
    }
}

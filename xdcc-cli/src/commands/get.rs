//! The `get` command: download every URL, one progress bar per transfer.
//!
//! URLs are grouped by bot so that two slots from the same bot never hold
//! two IRC presences at once; groups run concurrently, transfers within a
//! group sequentially.

use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;
use tracing::warn;

use xdcc_core::{
    FileLocator, SupervisedTransfer, TlsPolicy, TransferConfig, TransferEvent, TransferManager,
};

use crate::cli::GetArgs;
use crate::progress::{ProgressState, TransferProgressBar};

pub async fn run(args: GetArgs) -> Result<()> {
    let urls = collect_urls(&args)?;
    if urls.is_empty() {
        bail!("no URLs provided; pass them as arguments or via -i FILE");
    }

    let tls = TlsPolicy {
        ssl_only: args.ssl_only,
        no_ssl: args.no_ssl,
        allow_unknown_authority: args.allow_unknown_authority,
    };

    let mut configs = Vec::new();
    for url in &urls {
        match FileLocator::parse(url) {
            Ok(locator) => configs.push(TransferConfig {
                locator,
                out_dir: args.output_dir.clone(),
                tls,
            }),
            Err(e) => {
                warn!(%url, "skipping URL");
                eprintln!("{e}");
            }
        }
    }

    let multi = MultiProgress::new();
    let mut group_tasks = Vec::new();

    for group in TransferManager::group_by_bot(configs) {
        let multi = multi.clone();
        group_tasks.push(tokio::spawn(async move {
            for config in group {
                run_transfer(config, &multi).await;
            }
        }));
    }

    for task in group_tasks {
        let _ = task.await;
    }
    Ok(())
}

/// Positional URLs plus the `-i` file, blank lines skipped.
fn collect_urls(args: &GetArgs) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.input_file {
        urls.extend(load_url_file(path)?);
    }
    Ok(urls)
}

fn load_url_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read URL list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Runs one transfer to its terminal event, rendering progress.
async fn run_transfer(config: TransferConfig, multi: &MultiProgress) {
    let locator = config.locator.clone();
    let bar = TransferProgressBar::new(multi);
    bar.set_file_name(&locator.to_string());

    let mut transfer = SupervisedTransfer::new(config);
    let Some(mut events) = transfer.take_events() else {
        return;
    };

    if let Err(e) = transfer.start().await {
        bar.set_state(ProgressState::Aborted);
        eprintln!("{locator}: {e}");
        if e.is_certificate_error() {
            eprintln!("use the --allow-unknown-authority flag to skip certificate verification");
        }
        return;
    }

    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Started {
                file_name,
                file_size,
            } => {
                bar.set_total(file_size);
                bar.set_file_name(&file_name);
                bar.set_state(ProgressState::Downloading);
            }
            TransferEvent::Progress {
                transferred_bytes, ..
            } => {
                bar.increment(transferred_bytes);
            }
            TransferEvent::Completed => {
                bar.set_state(ProgressState::Done);
                return;
            }
            TransferEvent::Aborted { reason } => {
                bar.set_state(ProgressState::Aborted);
                eprintln!("{locator}: {reason}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_load_url_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "irc://net/chan/Bot/1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();
        writeln!(file, "irc://net/chan/Bot/2").unwrap();

        let urls = load_url_file(file.path()).unwrap();
        assert_eq!(urls, vec!["irc://net/chan/Bot/1", "irc://net/chan/Bot/2"]);
    }

    #[test]
    fn test_load_url_file_missing_file_errors() {
        let err = load_url_file(Path::new("/nonexistent/urls.txt")).unwrap_err();
        assert!(err.to_string().contains("unable to read URL list"));
    }
}

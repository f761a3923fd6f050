//! Keyword search across third-party XDCC indexes.
//!
//! Heterogeneous HTTP providers implement [`SearchProvider`]; the
//! [`ProviderAggregator`] fans a query out to all of them in parallel,
//! tolerates individual failures, and merges the results keyed by locator.

mod size;
mod sun_xdcc;
mod xdcc_eu;

pub use size::{format_size, parse_file_size, GIGA_BYTE, KILO_BYTE, MEGA_BYTE, SIZE_UNKNOWN};
pub use sun_xdcc::SunXdccProvider;
pub use xdcc_eu::XdccEuProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::locator::FileLocator;

/// Errors from a single search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The HTTP request failed.
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The index answered with a non-success status.
    #[error("status code error: {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body did not have the expected shape.
    #[error("unable to parse index response: {reason}")]
    Parse { reason: String },
}

impl SearchError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Where the file can be fetched from.
    pub locator: FileLocator,
    /// Display name published by the index.
    pub name: String,
    /// Size in bytes, or [`SIZE_UNKNOWN`].
    pub size: i64,
    /// Slot number, mirroring `locator.slot`.
    pub slot: u32,
}

/// A keyword-searchable XDCC index.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Runs one keyword query.
    async fn search(&self, keywords: &[String]) -> Result<Vec<FileInfo>, SearchError>;
}

/// Joins keywords into the `a+b+c` form the indexes expect; the `url` crate
/// encodes the embedded spaces as `+` in query pairs.
pub(crate) fn keyword_term(keywords: &[String]) -> String {
    keywords
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fans queries out to registered providers and merges their results.
#[derive(Default)]
pub struct ProviderAggregator {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl ProviderAggregator {
    /// An aggregator with no providers; see [`Self::register`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The production configuration: xdcc.eu and sunxdcc.com.
    #[must_use]
    pub fn with_default_providers() -> Self {
        let mut aggregator = Self::new();
        aggregator.register(Arc::new(XdccEuProvider::new()));
        aggregator.register(Arc::new(SunXdccProvider::new()));
        aggregator
    }

    /// Adds a provider. Registration order is the merge order: when two
    /// providers return the same locator, the later registration wins.
    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.push(provider);
    }

    /// Queries every provider in parallel and returns the deduplicated
    /// union of their results.
    ///
    /// A failing provider is skipped with a warning; completion is bounded
    /// by the slowest remaining provider because every task is joined
    /// unconditionally, error or not.
    pub async fn search(&self, keywords: &[String]) -> Vec<FileInfo> {
        let mut handles = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let keywords = keywords.to_vec();
            let name = provider.name().to_string();
            handles.push((
                name,
                tokio::spawn(async move { provider.search(&keywords).await }),
            ));
        }

        let mut merged: HashMap<FileLocator, FileInfo> = HashMap::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(results)) => {
                    for info in results {
                        merged.insert(info.locator.clone(), info);
                    }
                }
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "search provider failed, skipping");
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "search provider task panicked");
                }
            }
        }

        merged.into_values().collect()
    }
}

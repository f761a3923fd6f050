//! Search provider for the sunxdcc.com JSON API.
//!
//! The API (see <https://sunxdcc.com/#api>) answers with a struct of eight
//! parallel arrays; row `i` of a result is the `i`-th element of each array.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::locator::FileLocator;
use crate::search::size::{parse_file_size, SIZE_UNKNOWN};
use crate::search::{keyword_term, FileInfo, SearchError, SearchProvider};

const SUN_XDCC_ENDPOINT: &str = "http://sunxdcc.com/deliver.php";

/// JSON scraper for `sunxdcc.com`.
pub struct SunXdccProvider {
    client: reqwest::Client,
    endpoint: String,
}

/// The eight parallel arrays of one API response.
#[derive(Debug, Deserialize)]
struct SunXdccResponse {
    botrec: Vec<String>,
    network: Vec<String>,
    bot: Vec<String>,
    channel: Vec<String>,
    packnum: Vec<String>,
    gets: Vec<String>,
    fsize: Vec<String>,
    fname: Vec<String>,
}

impl SunXdccResponse {
    /// All eight arrays must agree on a length for row indexing to be sound.
    fn row_count(&self) -> Result<usize, SearchError> {
        let lengths = [
            self.botrec.len(),
            self.network.len(),
            self.bot.len(),
            self.channel.len(),
            self.packnum.len(),
            self.gets.len(),
            self.fsize.len(),
            self.fname.len(),
        ];
        if lengths.iter().any(|&l| l != lengths[0]) {
            return Err(SearchError::parse(
                "response arrays do not share the same length",
            ));
        }
        Ok(lengths[0])
    }

    fn row(&self, index: usize) -> Option<FileInfo> {
        let slot: u32 = self.packnum[index].strip_prefix('#')?.parse().ok()?;

        let channel = &self.channel[index];
        let channel = if channel.starts_with('#') {
            channel.clone()
        } else {
            format!("#{channel}")
        };

        // Sizes arrive bracket-wrapped, e.g. "[683M]".
        let size_field = self.fsize[index]
            .trim_start_matches('[')
            .trim_end_matches(']');

        Some(FileInfo {
            locator: FileLocator {
                network: self.network[index].clone(),
                channel,
                user_name: self.bot[index].clone(),
                slot,
            },
            name: self.fname[index].clone(),
            size: parse_file_size(size_field).unwrap_or(SIZE_UNKNOWN),
            slot,
        })
    }
}

impl Default for SunXdccProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SunXdccProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(SUN_XDCC_ENDPOINT)
    }

    /// Provider against a non-default endpoint (used by tests).
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for SunXdccProvider {
    fn name(&self) -> &str {
        "sunxdcc.com"
    }

    async fn search(&self, keywords: &[String]) -> Result<Vec<FileInfo>, SearchError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SearchError::parse(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("sterm", &keyword_term(keywords));

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: SunXdccResponse = response.json().await?;
        let rows = body.row_count()?;
        Ok((0..rows).filter_map(|i| body.row(i)).collect())
    }
}

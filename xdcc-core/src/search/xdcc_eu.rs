//! Search provider for the xdcc.eu HTML index.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::locator::FileLocator;
use crate::search::size::{parse_file_size, SIZE_UNKNOWN};
use crate::search::{keyword_term, FileInfo, SearchError, SearchProvider};

const XDCC_EU_ENDPOINT: &str = "https://www.xdcc.eu/search.php";

/// Cells per result row: Network, Channel, Bot, `#slot`, Gets, Size, Filename.
const XDCC_EU_COLUMNS: usize = 7;

/// HTML scraper for `xdcc.eu`.
pub struct XdccEuProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for XdccEuProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl XdccEuProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(XDCC_EU_ENDPOINT)
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
impl SearchProvider for XdccEuProvider {
    fn name(&self) -> &str {
        "xdcc.eu"
    }

    async fn search(&self, keywords: &[String]) -> Result<Vec<FileInfo>, SearchError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SearchError::parse(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("searchkey", &keyword_term(keywords));

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_document(&body)
    }
}

fn parse_document(body: &str) -> Result<Vec<FileInfo>, SearchError> {
    let rows = Selector::parse("tr").map_err(|_| SearchError::parse("row selector"))?;
    let cells = Selector::parse("td").map_err(|_| SearchError::parse("cell selector"))?;
    let anchors = Selector::parse("a").map_err(|_| SearchError::parse("anchor selector"))?;

    let document = Html::parse_document(body);
    let mut results = Vec::new();

    for row in document.select(&rows) {
        let row_cells: Vec<ElementRef> = row.select(&cells).collect();
        if let Some(info) = parse_row(&row_cells, &anchors) {
            results.push(info);
        }
    }
    Ok(results)
}

/// One row: text fields carry everything but the channel URL, which lives in
/// the channel cell's first anchor as an `irc://network/channel` href.
fn parse_row(cells: &[ElementRef], anchors: &Selector) -> Option<FileInfo> {
    if cells.len() != XDCC_EU_COLUMNS {
        return None;
    }

    let fields: Vec<String> = cells
        .iter()
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect();

    let href = cells[1]
        .select(anchors)
        .next()
        .and_then(|a| a.value().attr("href"))?;

    let slot: u32 = fields[3].strip_prefix('#')?.parse().ok()?;
    let bot = &fields[2];
    let locator = FileLocator::parse(&format!("{href}/{bot}/{slot}")).ok()?;

    Some(FileInfo {
        locator,
        name: fields[6].clone(),
        size: parse_file_size(&fields[5]).unwrap_or(SIZE_UNKNOWN),
        slot,
    })
}

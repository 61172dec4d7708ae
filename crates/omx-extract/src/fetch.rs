//! Paginated fetcher
//!
//! Walks one partition's result set page by page, following the next link
//! each response carries until the source signals the end. The fetcher owns
//! its [`FetchCursor`] for the lifetime of one partition and is discarded
//! afterwards; it is not restartable mid-partition, so a failed partition is
//! simply re-fetched from page one on the next run.

use crate::error::{ExtractError, Result};
use crate::partition::Partition;
use crate::retry::RetryPolicy;
use crate::schema::RawRecord;
use crate::source::SourceSpec;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Per-request timeout, matching the retry policy's maximum backoff.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

/// Build the HTTP client shared by all partition tasks of a run.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Ephemeral pagination state for one partition
///
/// Owned exclusively by one [`PageFetcher`]; never persisted.
#[derive(Debug, Clone)]
pub struct FetchCursor {
    /// Cursor token for the first request; the EBI API starts at `"*"`.
    pub cursor: String,
    /// Absolute URL of the next page, once a response has supplied one.
    pub next_url: Option<String>,
    /// Records yielded so far across all pages.
    pub records_seen: u64,
}

impl FetchCursor {
    fn start() -> Self {
        Self {
            cursor: "*".to_string(),
            next_url: None,
            records_seen: 0,
        }
    }
}

/// Cursor-following page iterator for one partition
pub struct PageFetcher {
    client: Client,
    source: SourceSpec,
    partition: Partition,
    page_size: u32,
    retry: RetryPolicy,
    cursor: FetchCursor,
    exhausted: bool,
}

impl PageFetcher {
    pub fn new(
        client: Client,
        source: SourceSpec,
        partition: Partition,
        page_size: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            source,
            partition,
            page_size,
            retry,
            cursor: FetchCursor::start(),
            exhausted: false,
        }
    }

    /// Records yielded so far.
    pub fn records_seen(&self) -> u64 {
        self.cursor.records_seen
    }

    /// The source's "updated within range" filter expression, in the EBI
    /// custom date-filter syntax.
    fn date_filter(&self) -> String {
        format!(
            "dt:update:from={}until={}",
            self.partition.range_start.format("%Y-%m-%d"),
            self.partition.range_end.format("%Y-%m-%d")
        )
    }

    /// Fetch the next page of raw records, or `None` when the source has
    /// signalled the end of results.
    ///
    /// Each page request is retried under the configured policy. A malformed
    /// record inside a well-formed page is dropped with a warning; a page
    /// that fails sanity checks as a whole aborts the partition.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        let body = self.fetch_page_body().await?;
        let page = body.as_object().ok_or_else(|| {
            ExtractError::MalformedPage("response body is not a JSON object".to_string())
        })?;

        // No `_embedded` key means zero results for the window.
        let records = match page.get("_embedded").and_then(|e| e.get("samples")) {
            Some(Value::Array(items)) => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    if is_well_formed(item) {
                        records.push(item.clone());
                    } else {
                        warn!(
                            partition = %self.partition.key(),
                            record = %truncate(&item.to_string(), 200),
                            "Dropping malformed record"
                        );
                    }
                }
                records
            },
            Some(other) => {
                return Err(ExtractError::MalformedPage(format!(
                    "expected a record array under _embedded.samples, got {}",
                    json_kind(other)
                )));
            },
            None => Vec::new(),
        };

        match page
            .get("_links")
            .and_then(|l| l.get("next"))
            .and_then(|n| n.get("href"))
            .and_then(|h| h.as_str())
        {
            Some(href) => self.cursor.next_url = Some(href.to_string()),
            None => self.exhausted = true,
        }

        self.cursor.records_seen += records.len() as u64;
        Ok(Some(records))
    }

    /// Issue one page request under the retry policy and parse the body.
    async fn fetch_page_body(&self) -> Result<Value> {
        let client = &self.client;
        let next_url = self.cursor.next_url.clone();
        let filter = self.date_filter();
        let size = self.page_size.to_string();

        self.retry
            .run(|| {
                let request = match &next_url {
                    Some(url) => client.get(url),
                    None => client.get(&self.source.base_url).query(&[
                        ("cursor", self.cursor.cursor.as_str()),
                        ("size", size.as_str()),
                        ("filter", filter.as_str()),
                    ]),
                };
                async move {
                    let response = request.send().await.map_err(ExtractError::from_reqwest)?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ExtractError::from_status(
                            status.as_u16(),
                            truncate(&body, 500),
                        ));
                    }
                    let body = response
                        .text()
                        .await
                        .map_err(ExtractError::from_reqwest)?;
                    serde_json::from_str(&body).map_err(|e| {
                        ExtractError::MalformedPage(format!("invalid JSON body: {}", e))
                    })
                }
            })
            .await
    }
}

/// A record must be a JSON object carrying a string accession to be keyed
/// downstream; anything else is dropped at the record level.
fn is_well_formed(record: &Value) -> bool {
    record
        .get("accession")
        .map(|a| a.is_string())
        .unwrap_or(false)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

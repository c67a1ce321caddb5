//! Concurrent homepage scanning.
//!
//! Every domain becomes its own tokio task. A semaphore caps how many of
//! those tasks are waiting on the network at once, and each task writes its
//! result into a shared collector slot reserved for its input position. A
//! failed fetch is recorded as an outcome tag and never touches other tasks,
//! so the batch always yields exactly one result per input domain.

use crate::content::{charset_from_content_type, count_words, decode_body, is_html};
use crate::error::ScanError;
use crate::types::{ScanConfig, ScanOutcome, ScanResult, SiteRankEntry};
use futures::future::join_all;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Scans homepages concurrently under a fixed in-flight cap.
///
/// # Example
///
/// ```rust,no_run
/// use topsite_scan_lib::{ConcurrentScanner, ScanConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ScanConfig::default()
///         .with_concurrency(20)
///         .with_timeout(Duration::from_secs(5));
///     let scanner = ConcurrentScanner::new(config)?;
///
///     let results = scanner
///         .scan(&["example.com".to_string(), "example.org".to_string()])
///         .await;
///     for result in results {
///         println!("{}: {} in {:?}", result.domain, result.outcome, result.elapsed);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ConcurrentScanner {
    http_client: reqwest::Client,
    config: ScanConfig,
}

impl ConcurrentScanner {
    /// Create a scanner with its own HTTP client.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout)
            .timeout(config.timeout.saturating_add(Duration::from_secs(2))) // Add buffer; the task timeout decides
            .build()
            .map_err(|e| {
                ScanError::network_with_source("Failed to create scanner HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan plain domains. Results come back in input order.
    pub async fn scan(&self, domains: &[String]) -> Vec<ScanResult> {
        let targets = domains.iter().map(|d| (d.clone(), None)).collect();
        self.scan_targets(targets).await
    }

    /// Scan ranking entries, carrying each entry's rank onto its result.
    pub async fn scan_entries(&self, entries: &[SiteRankEntry]) -> Vec<ScanResult> {
        let targets = entries
            .iter()
            .map(|e| (e.domain.clone(), Some(e.rank)))
            .collect();
        self.scan_targets(targets).await
    }

    async fn scan_targets(&self, targets: Vec<(String, Option<u32>)>) -> Vec<ScanResult> {
        info!(
            domains = targets.len(),
            concurrency = self.config.concurrency,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Starting homepage scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let collector = ResultCollector::new(targets.len());

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, (domain, rank))| {
                let semaphore = Arc::clone(&semaphore);
                let collector = collector.clone();
                let scanner = self.clone();

                tokio::spawn(async move {
                    // The semaphore is never closed, so acquiring cannot fail
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result = scanner.scan_one(&domain).await.with_rank(rank);
                    collector.record(index, result).await;
                })
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "Scan task ended without reporting");
            }
        }

        collector.finish(&targets).await
    }

    /// Fetch one homepage and turn whatever happens into a result.
    pub async fn scan_one(&self, domain: &str) -> ScanResult {
        let url = self.config.homepage_url(domain);

        let start = Instant::now();
        let fetched = tokio::time::timeout(self.config.timeout, self.fetch(&url)).await;
        let elapsed = start.elapsed();

        let result = match fetched {
            Err(_) => ScanResult::failure(
                domain,
                ScanOutcome::Timeout,
                elapsed,
                format!("no complete response within {:?}", self.config.timeout),
            ),
            Ok(Err(failure)) => {
                let mut result =
                    ScanResult::failure(domain, failure.outcome, elapsed, failure.message);
                result.headers = failure.headers;
                result
            }
            Ok(Ok(page)) => inspect_page(domain, page, elapsed),
        };

        debug!(
            domain,
            outcome = %result.outcome,
            status = ?result.status_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Scanned homepage"
        );
        result
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::from_transport(&e, Vec::new()))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let final_url = response.url().to_string();

        match response.bytes().await {
            Ok(body) => Ok(FetchedPage {
                status,
                headers,
                final_url,
                body: body.to_vec(),
            }),
            Err(e) => Err(FetchFailure::from_transport(&e, headers)),
        }
    }
}

/// A response whose body was read completely.
struct FetchedPage {
    status: u16,
    headers: Vec<(String, String)>,
    final_url: String,
    body: Vec<u8>,
}

/// Why a fetch did not produce a page.
struct FetchFailure {
    outcome: ScanOutcome,
    message: String,
    headers: Vec<(String, String)>,
}

impl FetchFailure {
    fn from_transport(err: &reqwest::Error, headers: Vec<(String, String)>) -> Self {
        let outcome = if err.is_timeout() {
            ScanOutcome::Timeout
        } else if err.is_decode() {
            ScanOutcome::DecodeError
        } else {
            ScanOutcome::ConnectionError
        };

        Self {
            outcome,
            message: err.to_string(),
            headers,
        }
    }
}

/// Decode the body and collect the success metadata.
fn inspect_page(domain: &str, page: FetchedPage, elapsed: Duration) -> ScanResult {
    let content_type = page
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone());
    let encoding = content_type.as_deref().and_then(charset_from_content_type);
    let body_bytes = page.body.len();

    match decode_body(&page.body, encoding.as_deref()) {
        Ok(text) => {
            let mut result = ScanResult::success(domain, page.status, page.headers, elapsed);
            result.body_bytes = Some(body_bytes);
            result.encoding = encoding;
            result.final_url = Some(page.final_url);
            if is_html(content_type.as_deref()) {
                result.word_count = Some(count_words(&text));
            }
            result
        }
        Err(message) => {
            let mut result = ScanResult::failure(domain, ScanOutcome::DecodeError, elapsed, message);
            result.headers = page.headers;
            result.body_bytes = Some(body_bytes);
            result.encoding = encoding;
            result.final_url = Some(page.final_url);
            result
        }
    }
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Write-once slots, one per input position, shared by all scan tasks.
#[derive(Clone)]
struct ResultCollector {
    slots: Arc<Mutex<Vec<Option<ScanResult>>>>,
}

impl ResultCollector {
    fn new(len: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![None; len])),
        }
    }

    async fn record(&self, index: usize, result: ScanResult) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(index) {
            if slot.is_none() {
                *slot = Some(result);
            }
        }
    }

    /// Take the results in input order. A slot nobody filled (the task
    /// panicked or was aborted) becomes a connection error.
    async fn finish(self, targets: &[(String, Option<u32>)]) -> Vec<ScanResult> {
        let mut slots = self.slots.lock().await;
        let slots = std::mem::take(&mut *slots);

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, (domain, rank))| {
                slot.unwrap_or_else(|| {
                    ScanResult::failure(
                        domain.as_str(),
                        ScanOutcome::ConnectionError,
                        Duration::ZERO,
                        "scan task ended without a result",
                    )
                    .with_rank(*rank)
                })
            })
            .collect()
    }
}

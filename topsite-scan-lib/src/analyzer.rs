//! Top-level pipeline: ranking fetch, homepage scan, report.

use crate::concurrent::ConcurrentScanner;
use crate::Result;
use crate::ranking::RankingClient;
use crate::report::ScanReport;
use crate::types::{Credentials, RankingConfig, ScanConfig, ScanResult, SiteRankEntry};
use std::time::Instant;
use tracing::info;

/// Runs the whole analysis for one set of credentials.
///
/// # Example
///
/// ```rust,no_run
/// use topsite_scan_lib::{Credentials, RankingConfig, ScanConfig, SiteAnalyzer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let analyzer = SiteAnalyzer::new(
///         Credentials::new("AKIDEXAMPLE", "secret"),
///         RankingConfig::default().with_count(20),
///         ScanConfig::default(),
///     )?;
///     let report = analyzer.run(20).await?;
///     println!("{} of {} homepages answered", report.success_count, report.total());
///     Ok(())
/// }
/// ```
pub struct SiteAnalyzer {
    credentials: Credentials,
    ranking: RankingClient,
    scanner: ConcurrentScanner,
}

impl SiteAnalyzer {
    pub fn new(
        credentials: Credentials,
        ranking_config: RankingConfig,
        scan_config: ScanConfig,
    ) -> Result<Self> {
        Ok(Self {
            credentials,
            ranking: RankingClient::new(ranking_config)?,
            scanner: ConcurrentScanner::new(scan_config)?,
        })
    }

    /// Build from already configured parts, e.g. a client with a custom signer.
    pub fn with_parts(
        credentials: Credentials,
        ranking: RankingClient,
        scanner: ConcurrentScanner,
    ) -> Self {
        Self {
            credentials,
            ranking,
            scanner,
        }
    }

    /// Retrieve the ordered domain list.
    pub async fn fetch_ranking(&self) -> Result<Vec<SiteRankEntry>> {
        self.ranking.fetch_top_sites(&self.credentials).await
    }

    /// Scan an explicit list of domains.
    pub async fn scan(&self, domains: &[String]) -> Vec<ScanResult> {
        self.scanner.scan(domains).await
    }

    /// Scan ranking entries and aggregate them into a report.
    ///
    /// The wall clock covers the scan phase only.
    pub async fn scan_entries(&self, entries: &[SiteRankEntry], top_headers: usize) -> ScanReport {
        let started = Instant::now();
        let results = self.scanner.scan_entries(entries).await;
        let wall_clock = started.elapsed();

        let report = ScanReport::build(
            results,
            wall_clock,
            self.scanner.config().concurrency,
            top_headers,
        );
        info!(
            domains = report.total(),
            succeeded = report.success_count,
            failed = report.failure_count,
            wall_clock_ms = report.wall_clock.as_millis() as u64,
            sum_elapsed_ms = report.sum_elapsed.as_millis() as u64,
            "Scan finished"
        );
        report
    }

    /// Fetch the ranking, scan every domain on it, and build the report.
    ///
    /// A ranking failure is returned before any homepage is requested.
    pub async fn run(&self, top_headers: usize) -> Result<ScanReport> {
        let entries = self.fetch_ranking().await?;
        Ok(self.scan_entries(&entries, top_headers).await)
    }
}

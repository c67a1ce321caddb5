//! # Topsite Scan Library
//!
//! Fetches a ranked list of the most visited websites from the Alexa Top
//! Sites service and scans each homepage concurrently, recording status,
//! headers, timing and visible word count for every site.
//!
//! The pipeline has three stages:
//!
//! 1. **Ranking fetch**: signed (Signature Version 2) requests to the ranking
//!    service, paged 100 sites at a time.
//! 2. **Concurrent scan**: one task per domain, bounded by a semaphore, each
//!    with its own timeout. Failures become outcome tags, never errors.
//! 3. **Report**: counts, wall clock and summed request time kept apart,
//!    word-count ranking and header statistics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use topsite_scan_lib::{ConcurrentScanner, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scanner = ConcurrentScanner::new(ScanConfig::default())?;
//!     let result = scanner.scan_one("example.com").await;
//!
//!     println!("{} -> {} {:?}", result.domain, result.outcome, result.status_code);
//!     Ok(())
//! }
//! ```

// Re-export main public API types and functions
pub use analyzer::SiteAnalyzer;
pub use concurrent::ConcurrentScanner;
pub use config::{
    load_env_config, ConfigManager, EnvConfig, FileConfig, OutputFormat, Settings,
};
pub use error::ScanError;
pub use ranking::{parse_top_sites, RankingClient};
pub use report::{HeaderStat, ScanReport, DEFAULT_TOP_HEADERS};
pub use signing::{RequestSigner, SignatureV2Signer, SignedRequest, UnsignedRequest};
pub use types::{
    Credentials, RankingConfig, ScanConfig, ScanOutcome, ScanResult, SiteRankEntry,
    DEFAULT_RANKING_ENDPOINT, MAX_SITE_COUNT, SITES_PER_PAGE,
};
pub use utils::{format_name_list, normalize_host};

// Public modules
pub mod content;
pub mod signing;

// Internal modules
mod analyzer;
mod concurrent;
mod config;
mod error;
mod ranking;
mod report;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, ScanError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Core data types for ranking and scanning.
//!
//! This module defines the records that flow between the three stages:
//! ranking entries coming out of the ranking fetch, scan results coming out of
//! the concurrent scanner, and the configuration both stages run with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default ranking endpoint (Alexa Top Sites).
pub const DEFAULT_RANKING_ENDPOINT: &str = "http://ats.amazonaws.com/";

/// The ranking service never returns more than this many sites per call.
pub const SITES_PER_PAGE: usize = 100;

/// Upper bound on how many sites a single run may request.
pub const MAX_SITE_COUNT: usize = 1000;

/// Access key pair used to sign ranking requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new<K: Into<String>, S: Into<String>>(key_id: K, secret_key: S) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Both halves present and free of surrounding whitespace.
    pub fn is_well_formed(&self) -> bool {
        let usable = |s: &str| !s.is_empty() && s.trim() == s;
        usable(&self.key_id) && usable(&self.secret_key)
    }
}

// Never print the secret, not even in debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// One entry of the ranking list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRankEntry {
    /// Domain name as reported by the ranking service (e.g., "google.com")
    pub domain: String,

    /// 1-based rank position
    pub rank: u32,
}

/// How a single homepage fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// A response was received and its body read (any HTTP status)
    #[serde(rename = "success")]
    Success,

    /// The request did not finish within the per-request timeout
    #[serde(rename = "timeout")]
    Timeout,

    /// Connection refused, DNS failure, TLS failure and other transport errors
    #[serde(rename = "connection_error")]
    ConnectionError,

    /// The body could not be decoded with the declared encoding
    #[serde(rename = "decode_error")]
    DecodeError,
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Success => write!(f, "Success"),
            ScanOutcome::Timeout => write!(f, "Timeout"),
            ScanOutcome::ConnectionError => write!(f, "ConnectionError"),
            ScanOutcome::DecodeError => write!(f, "DecodeError"),
        }
    }
}

/// Result of scanning one homepage.
///
/// Exactly one of these exists per requested domain. `status_code` is only
/// ever set when `outcome` is [`ScanOutcome::Success`]; use the constructors
/// to keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// The domain that was scanned
    pub domain: String,

    /// Ranking position, when the domain came from the ranking list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    pub outcome: ScanOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Response headers in arrival order; a name may repeat
    pub headers: Vec<(String, String)>,

    /// Time spent on this request alone
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_bytes: Option<usize>,

    /// Charset label declared by the response, lowercased
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// URL of the final response after redirects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,

    /// Visible words on the page (HTML responses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,

    /// Position among all scanned sites ordered by word count, largest first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count_rank: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScanResult {
    /// A fetch that produced a response.
    pub fn success<D: Into<String>>(
        domain: D,
        status_code: u16,
        headers: Vec<(String, String)>,
        elapsed: Duration,
    ) -> Self {
        Self {
            domain: domain.into(),
            rank: None,
            outcome: ScanOutcome::Success,
            status_code: Some(status_code),
            headers,
            elapsed,
            body_bytes: None,
            encoding: None,
            final_url: None,
            word_count: None,
            word_count_rank: None,
            error_message: None,
        }
    }

    /// A fetch that failed. Headers already received are kept.
    ///
    /// Passing [`ScanOutcome::Success`] here is a logic error and is recorded
    /// as a connection error instead.
    pub fn failure<D: Into<String>, M: Into<String>>(
        domain: D,
        outcome: ScanOutcome,
        elapsed: Duration,
        message: M,
    ) -> Self {
        let outcome = if outcome.is_success() {
            ScanOutcome::ConnectionError
        } else {
            outcome
        };
        Self {
            domain: domain.into(),
            rank: None,
            outcome,
            status_code: None,
            headers: Vec::new(),
            elapsed,
            body_bytes: None,
            encoding: None,
            final_url: None,
            word_count: None,
            word_count_rank: None,
            error_message: Some(message.into()),
        }
    }

    pub fn with_rank(mut self, rank: Option<u32>) -> Self {
        self.rank = rank;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Header names seen on this response, lowercased and de-duplicated.
    pub fn header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .headers
            .iter()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Settings for the concurrent scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum number of requests in flight
    /// Default: 10, Range: 1-100
    pub concurrency: usize,

    /// Timeout for each individual homepage fetch
    /// Default: 10 seconds
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// URL scheme used for homepages ("http" or "https")
    pub scheme: String,

    /// User-Agent header sent to scanned sites
    pub user_agent: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: Duration::from_secs(10),
            scheme: "http".to_string(),
            user_agent: format!("topsite-scan/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ScanConfig {
    /// Set the concurrency cap, clamped to 1-100.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 100);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Homepage URL for a domain.
    pub fn homepage_url(&self, domain: &str) -> String {
        format!("{}://{}/", self.scheme, domain)
    }
}

/// Settings for the ranking fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// How many top sites to request
    /// Default: 100, Range: 1-1000
    pub count: usize,

    /// Two-letter country code; `None` asks for the global list
    pub country: Option<String>,

    /// Service endpoint, scheme + host (+ optional port and path)
    pub endpoint: String,

    /// Timeout for each ranking request
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            count: 100,
            country: Some("US".to_string()),
            endpoint: DEFAULT_RANKING_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RankingConfig {
    /// Set the number of sites, clamped to 1-1000.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.clamp(1, MAX_SITE_COUNT);
        self
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Number of ranking calls needed for the configured count.
    pub fn page_count(&self) -> usize {
        self.count.div_ceil(SITES_PER_PAGE)
    }
}

/// Durations travel as whole milliseconds in JSON.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

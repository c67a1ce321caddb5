//! Configuration file parsing and management.
//!
//! Settings come from three layers. Built-in defaults sit at the bottom,
//! TOML files override them, and `TSS_*` environment variables override the
//! files. Credentials are never read from either; they only come from the
//! command line.

use crate::error::ScanError;
use crate::report::DEFAULT_TOP_HEADERS;
use crate::types::{RankingConfig, ScanConfig, MAX_SITE_COUNT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const LOCAL_CANDIDATES: &[&str] = &["topsite-scan.toml", ".topsite-scan.toml"];
const HOME_CANDIDATES: &[&str] = &[".topsite-scan.toml", "topsite-scan.toml"];

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking: Option<RankingSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
}

/// `[scan]`: how homepages are fetched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanSection {
    /// Maximum requests in flight (1-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-request timeout (as string, e.g., "5s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// "http" or "https"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// `[ranking]`: what to ask the ranking service for.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RankingSection {
    /// Number of top sites (1-1000)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    /// Two-letter country code; an empty string selects the global list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// `[output]`: report rendering.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSection {
    /// "text" or "json"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// How many header names the report lists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_headers: Option<usize>,
}

/// How the report is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Configuration discovery and loading.
///
/// The search roots are fields so that discovery can be pointed at
/// temporary directories.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    local_dir: PathBuf,
    home_dir: Option<PathBuf>,
    xdg_config_dir: Option<PathBuf>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Search the current directory, `$HOME` and `$XDG_CONFIG_HOME`
    /// (falling back to `~/.config`).
    pub fn new() -> Self {
        let home_dir = env::var_os("HOME").map(PathBuf::from);
        let xdg_config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir.as_ref().map(|home| home.join(".config")));

        Self {
            local_dir: PathBuf::from("."),
            home_dir,
            xdg_config_dir,
        }
    }

    pub fn with_roots(
        local_dir: PathBuf,
        home_dir: Option<PathBuf>,
        xdg_config_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            local_dir,
            home_dir,
            xdg_config_dir,
        }
    }

    /// Load and validate a single configuration file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScanError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            ScanError::config(format!(
                "Failed to parse TOML configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load every discovered file and merge them, later files winning.
    ///
    /// Order, lowest precedence first: XDG config, home directory, current
    /// directory. A discovered file that fails to load is skipped with a
    /// warning.
    pub fn discover_and_load(&self) -> FileConfig {
        let candidates = [
            self.xdg_config_path(),
            self.home_config_path(),
            self.local_config_path(),
        ];

        let mut merged = FileConfig::default();
        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded configuration file");
                    merged = merge_configs(merged, config);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }
        merged
    }

    fn local_config_path(&self) -> Option<PathBuf> {
        first_existing(&self.local_dir, LOCAL_CANDIDATES)
    }

    fn home_config_path(&self) -> Option<PathBuf> {
        first_existing(self.home_dir.as_ref()?, HOME_CANDIDATES)
    }

    fn xdg_config_path(&self) -> Option<PathBuf> {
        let path = self
            .xdg_config_dir
            .as_ref()?
            .join("topsite-scan")
            .join("config.toml");
        path.exists().then_some(path)
    }
}

fn first_existing(dir: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Merge two configurations field by field; values from `higher` win.
pub fn merge_configs(lower: FileConfig, higher: FileConfig) -> FileConfig {
    FileConfig {
        scan: match (lower.scan, higher.scan) {
            (Some(lower), Some(higher)) => Some(ScanSection {
                concurrency: higher.concurrency.or(lower.concurrency),
                timeout: higher.timeout.or(lower.timeout),
                scheme: higher.scheme.or(lower.scheme),
                user_agent: higher.user_agent.or(lower.user_agent),
            }),
            (lower, higher) => higher.or(lower),
        },
        ranking: match (lower.ranking, higher.ranking) {
            (Some(lower), Some(higher)) => Some(RankingSection {
                count: higher.count.or(lower.count),
                country: higher.country.or(lower.country),
                endpoint: higher.endpoint.or(lower.endpoint),
            }),
            (lower, higher) => higher.or(lower),
        },
        output: match (lower.output, higher.output) {
            (Some(lower), Some(higher)) => Some(OutputSection {
                format: higher.format.or(lower.format),
                top_headers: higher.top_headers.or(lower.top_headers),
            }),
            (lower, higher) => higher.or(lower),
        },
    }
}

/// Check a loaded file for out-of-range or malformed values.
pub fn validate_config(config: &FileConfig) -> Result<(), ScanError> {
    if let Some(scan) = &config.scan {
        if let Some(concurrency) = scan.concurrency {
            if concurrency == 0 || concurrency > 100 {
                return Err(ScanError::config("Concurrency must be between 1 and 100"));
            }
        }

        if let Some(timeout) = &scan.timeout {
            if parse_timeout_string(timeout).is_none() {
                return Err(ScanError::config(format!(
                    "Invalid timeout '{}'. Use format like '5s', '30s', '2m' (at most 60m)",
                    timeout
                )));
            }
        }

        if let Some(scheme) = &scan.scheme {
            if !is_valid_scheme(scheme) {
                return Err(ScanError::config(format!(
                    "Invalid scheme '{}'. Use 'http' or 'https'",
                    scheme
                )));
            }
        }
    }

    if let Some(ranking) = &config.ranking {
        if let Some(count) = ranking.count {
            if count == 0 || count > MAX_SITE_COUNT {
                return Err(ScanError::config(format!(
                    "Site count must be between 1 and {}",
                    MAX_SITE_COUNT
                )));
            }
        }

        if let Some(country) = &ranking.country {
            if !is_valid_country(country) {
                return Err(ScanError::config(format!(
                    "Invalid country code '{}'. Use a two-letter code or an empty string",
                    country
                )));
            }
        }

        if let Some(endpoint) = &ranking.endpoint {
            if !is_valid_endpoint(endpoint) {
                return Err(ScanError::config(format!(
                    "Invalid ranking endpoint '{}'",
                    endpoint
                )));
            }
        }
    }

    if let Some(output) = &config.output {
        if let Some(format) = &output.format {
            if OutputFormat::parse(format).is_none() {
                return Err(ScanError::config(format!(
                    "Unknown output format '{}'. Use 'text' or 'json'",
                    format
                )));
            }
        }
    }

    Ok(())
}

/// Configuration taken from `TSS_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<String>,
    pub count: Option<usize>,
    /// `Some("")` selects the global list
    pub country: Option<String>,
    pub scheme: Option<String>,
    pub endpoint: Option<String>,
    pub json: Option<bool>,
    /// Explicit config file; disables discovery
    pub config: Option<String>,
}

impl EnvConfig {
    /// Build from any variable lookup. Invalid values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = EnvConfig::default();

        if let Some(val) = lookup("TSS_CONCURRENCY") {
            match val.trim().parse::<usize>() {
                Ok(n) if (1..=100).contains(&n) => env_config.concurrency = Some(n),
                _ => warn!("Invalid TSS_CONCURRENCY='{}', must be 1-100", val),
            }
        }

        if let Some(val) = lookup("TSS_TIMEOUT") {
            if parse_timeout_string(&val).is_some() {
                env_config.timeout = Some(val);
            } else {
                warn!("Invalid TSS_TIMEOUT='{}', use format like '5s', '30s', '2m'", val);
            }
        }

        if let Some(val) = lookup("TSS_COUNT") {
            match val.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_SITE_COUNT).contains(&n) => env_config.count = Some(n),
                _ => warn!("Invalid TSS_COUNT='{}', must be 1-{}", val, MAX_SITE_COUNT),
            }
        }

        if let Some(val) = lookup("TSS_COUNTRY") {
            if is_valid_country(&val) {
                env_config.country = Some(val.trim().to_string());
            } else {
                warn!("Invalid TSS_COUNTRY='{}', use a two-letter code", val);
            }
        }

        if let Some(val) = lookup("TSS_SCHEME") {
            if is_valid_scheme(&val) {
                env_config.scheme = Some(val.trim().to_ascii_lowercase());
            } else {
                warn!("Invalid TSS_SCHEME='{}', use http or https", val);
            }
        }

        if let Some(val) = lookup("TSS_ENDPOINT") {
            if is_valid_endpoint(&val) {
                env_config.endpoint = Some(val.trim().to_string());
            } else {
                warn!("Invalid TSS_ENDPOINT='{}'", val);
            }
        }

        if let Some(val) = lookup("TSS_JSON") {
            match parse_bool(&val) {
                Some(json) => env_config.json = Some(json),
                None => warn!("Invalid TSS_JSON='{}', use true/false", val),
            }
        }

        if let Some(val) = lookup("TSS_CONFIG") {
            if !val.trim().is_empty() {
                env_config.config = Some(val);
            }
        }

        env_config
    }
}

/// Load configuration from the process environment.
pub fn load_env_config() -> EnvConfig {
    EnvConfig::from_lookup(|name| env::var(name).ok())
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scan: ScanConfig,
    pub ranking: RankingConfig,
    pub output: OutputFormat,
    pub top_headers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            ranking: RankingConfig::default(),
            output: OutputFormat::Text,
            top_headers: DEFAULT_TOP_HEADERS,
        }
    }
}

impl Settings {
    /// Apply a (validated) file layer and then the environment layer on top
    /// of the defaults.
    pub fn from_layers(file: &FileConfig, env_config: &EnvConfig) -> Self {
        let mut settings = Settings::default();

        if let Some(scan) = &file.scan {
            if let Some(concurrency) = scan.concurrency {
                settings.scan = settings.scan.with_concurrency(concurrency);
            }
            if let Some(secs) = scan.timeout.as_deref().and_then(parse_timeout_string) {
                settings.scan = settings.scan.with_timeout(Duration::from_secs(secs));
            }
            if let Some(scheme) = &scan.scheme {
                settings.scan = settings.scan.with_scheme(scheme.trim().to_ascii_lowercase());
            }
            if let Some(user_agent) = &scan.user_agent {
                settings.scan = settings.scan.with_user_agent(user_agent.clone());
            }
        }

        if let Some(ranking) = &file.ranking {
            if let Some(count) = ranking.count {
                settings.ranking = settings.ranking.with_count(count);
            }
            if let Some(country) = &ranking.country {
                settings.ranking = settings.ranking.with_country(Some(country.clone()));
            }
            if let Some(endpoint) = &ranking.endpoint {
                settings.ranking = settings.ranking.with_endpoint(endpoint.clone());
            }
        }

        if let Some(output) = &file.output {
            if let Some(format) = output.format.as_deref().and_then(OutputFormat::parse) {
                settings.output = format;
            }
            if let Some(top_headers) = output.top_headers {
                settings.top_headers = top_headers;
            }
        }

        if let Some(concurrency) = env_config.concurrency {
            settings.scan = settings.scan.with_concurrency(concurrency);
        }
        if let Some(secs) = env_config.timeout.as_deref().and_then(parse_timeout_string) {
            settings.scan = settings.scan.with_timeout(Duration::from_secs(secs));
        }
        if let Some(scheme) = &env_config.scheme {
            settings.scan = settings.scan.with_scheme(scheme.clone());
        }
        if let Some(count) = env_config.count {
            settings.ranking = settings.ranking.with_count(count);
        }
        if let Some(country) = &env_config.country {
            settings.ranking = settings.ranking.with_country(Some(country.clone()));
        }
        if let Some(endpoint) = &env_config.endpoint {
            settings.ranking = settings.ranking.with_endpoint(endpoint.clone());
        }
        if let Some(json) = env_config.json {
            settings.output = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            };
        }

        settings
    }

    /// Resolve settings for a run: an explicit `TSS_CONFIG` file must load,
    /// otherwise discovered files are merged.
    pub fn load(manager: &ConfigManager, env_config: &EnvConfig) -> Result<Self, ScanError> {
        let file = match &env_config.config {
            Some(path) => manager.load_file(path)?,
            None => manager.discover_and_load(),
        };
        Ok(Self::from_layers(&file, env_config))
    }
}

/// Longest accepted per-request timeout, in seconds.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Parse a timeout string like "5s", "30s", "2m" into seconds.
///
/// A bare number is taken as seconds. Zero and anything over an hour are rejected.
fn parse_timeout_string(timeout_str: &str) -> Option<u64> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let secs = if let Some(s) = timeout_str.strip_suffix('s') {
        s.parse::<u64>().ok()
    } else if let Some(m) = timeout_str.strip_suffix('m') {
        m.parse::<u64>().ok().and_then(|m| m.checked_mul(60))
    } else {
        timeout_str.parse::<u64>().ok()
    };

    secs.filter(|&s| s > 0 && s <= MAX_TIMEOUT_SECS)
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    matches!(scheme.trim().to_ascii_lowercase().as_str(), "http" | "https")
}

fn is_valid_country(country: &str) -> bool {
    let country = country.trim();
    country.is_empty() || (country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()))
}

fn is_valid_endpoint(endpoint: &str) -> bool {
    reqwest::Url::parse(endpoint.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

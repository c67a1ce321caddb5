//! Ranking fetch: asks the top-sites service for the ordered domain list.
//!
//! Every call is a signed GET against the service endpoint. The service
//! answers with an XML document listing `<aws:Site>` entries, or with an
//! `<Errors>` document when it rejects the request. Nothing here is retried:
//! any failure is returned to the caller and ends the run.

use crate::error::ScanError;
use crate::signing::{
    current_timestamp, signature_v2_params, RequestSigner, SignatureV2Signer, UnsignedRequest,
};
use crate::types::{Credentials, RankingConfig, SiteRankEntry, SITES_PER_PAGE};
use crate::utils::normalize_host;
use regex::Regex;
use reqwest::StatusCode;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

lazy_static::lazy_static! {
    static ref SITE_RE: Regex = Regex::new(r"(?s)<(?:\w+:)?Site>(.*?)</(?:\w+:)?Site>")
        .expect("site pattern is valid");
    static ref DATA_URL_RE: Regex =
        Regex::new(r"(?s)<(?:\w+:)?DataUrl[^>]*>\s*([^<]*?)\s*</(?:\w+:)?DataUrl>")
            .expect("data url pattern is valid");
    static ref RANK_RE: Regex = Regex::new(r"<(?:\w+:)?Rank>\s*(\d+)\s*</(?:\w+:)?Rank>")
        .expect("rank pattern is valid");
    static ref ERROR_CODE_RE: Regex = Regex::new(r"<(?:\w+:)?Code>\s*([^<]*?)\s*</(?:\w+:)?Code>")
        .expect("error code pattern is valid");
    static ref ERROR_MESSAGE_RE: Regex =
        Regex::new(r"(?s)<(?:\w+:)?Message>\s*([^<]*?)\s*</(?:\w+:)?Message>")
            .expect("error message pattern is valid");
    static ref TOP_SITES_MARKER_RE: Regex = Regex::new(r"<(?:\w+:)?TopSites(?:Response|Result)?[\s>]")
        .expect("marker pattern is valid");
}

/// Error codes the service uses when it does not accept the credentials.
const AUTH_ERROR_CODES: &[&str] = &[
    "AuthFailure",
    "SignatureDoesNotMatch",
    "InvalidClientTokenId",
    "InvalidAccessKeyId",
    "MissingAuthenticationToken",
    "MissingClientTokenId",
    "RequestExpired",
    "OptInRequired",
    "AccessDenied",
    "UnrecognizedClientException",
];

/// Client for the top-sites ranking service.
#[derive(Clone)]
pub struct RankingClient {
    http_client: reqwest::Client,
    config: RankingConfig,
    signer: Arc<dyn RequestSigner>,
}

impl RankingClient {
    /// Create a client that signs with Signature Version 2.
    pub fn new(config: RankingConfig) -> Result<Self, ScanError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ScanError::network_with_source("Failed to create ranking HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            config,
            signer: Arc::new(SignatureV2Signer::new()),
        })
    }

    /// Swap in a different signing scheme.
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Fetch the configured number of top sites, ordered by rank.
    ///
    /// # Errors
    ///
    /// - `Authentication` for blank credentials or a rejected signature
    /// - `Service` for unexpected statuses or a response we cannot parse
    /// - `NetworkError` / `Timeout` when the service cannot be reached
    pub async fn fetch_top_sites(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<SiteRankEntry>, ScanError> {
        if !credentials.is_well_formed() {
            return Err(ScanError::authentication(
                "Access key id and secret key must both be non-empty",
            ));
        }

        let wanted = self.config.count;
        let mut entries = Vec::with_capacity(wanted);

        for page in 0..self.config.page_count() {
            let start = page * SITES_PER_PAGE + 1;
            let page_size = SITES_PER_PAGE.min(wanted - page * SITES_PER_PAGE);

            let page_entries = self.fetch_page(credentials, start, page_size).await?;
            let short_page = page_entries.len() < page_size;
            entries.extend(page_entries);

            if short_page {
                debug!(page = page + 1, "Ranking list ended early");
                break;
            }
        }

        let entries = order_and_dedup(entries, wanted);
        info!(sites = entries.len(), "Fetched ranking list");
        Ok(entries)
    }

    async fn fetch_page(
        &self,
        credentials: &Credentials,
        start: usize,
        count: usize,
    ) -> Result<Vec<SiteRankEntry>, ScanError> {
        let request = UnsignedRequest::from_endpoint(
            &self.config.endpoint,
            self.page_params(credentials, start, count),
        )?;
        let signed = self.signer.sign(&request, credentials)?;

        debug!(start, count, host = %request.host, "Requesting ranking page");

        let mut builder = self.http_client.get(&signed.url);
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScanError::timeout("ranking request", self.config.timeout));
            }
        };

        interpret_response(status, &body, start as u32)
    }

    fn page_params(
        &self,
        credentials: &Credentials,
        start: usize,
        count: usize,
    ) -> Vec<(String, String)> {
        let mut params = vec![
            ("Action".to_string(), "TopSites".to_string()),
            ("Count".to_string(), count.to_string()),
            ("ResponseGroup".to_string(), "Country".to_string()),
            ("Start".to_string(), start.to_string()),
        ];
        if let Some(country) = &self.config.country {
            params.push(("CountryCode".to_string(), country.to_ascii_uppercase()));
        }
        params.extend(signature_v2_params(&credentials.key_id, &current_timestamp()));
        params
    }
}

/// Turn a status + body into entries or the matching error.
fn interpret_response(
    status: StatusCode,
    body: &str,
    first_rank: u32,
) -> Result<Vec<SiteRankEntry>, ScanError> {
    if let Some((code, message)) = parse_error_document(body) {
        if is_auth_error_code(&code) || is_auth_status(status) {
            return Err(ScanError::authentication_with_code(message, code));
        }
        return Err(ScanError::service_with_status(
            format!("{}: {}", code, message),
            status.as_u16(),
        ));
    }

    if is_auth_status(status) {
        return Err(ScanError::authentication(format!(
            "Ranking service refused the request ({})",
            status
        )));
    }

    if !status.is_success() {
        return Err(ScanError::service_with_status(
            format!("Ranking service returned {}", status),
            status.as_u16(),
        ));
    }

    parse_top_sites(body, first_rank)
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn is_auth_error_code(code: &str) -> bool {
    AUTH_ERROR_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
}

/// Extract the ordered site list from a TopSites response.
///
/// `first_rank` is used for sites whose rank element is missing, counting up
/// from the page's start position.
pub fn parse_top_sites(xml: &str, first_rank: u32) -> Result<Vec<SiteRankEntry>, ScanError> {
    if !TOP_SITES_MARKER_RE.is_match(xml) {
        return Err(ScanError::service("Response is not a TopSites document"));
    }

    let mut entries = Vec::new();
    for (idx, site) in SITE_RE.captures_iter(xml).enumerate() {
        let block = &site[1];

        let raw_domain = match DATA_URL_RE.captures(block) {
            Some(caps) => decode_xml_entities(&caps[1]),
            None => {
                debug!(position = idx, "Skipping site entry without DataUrl");
                continue;
            }
        };

        let domain = match normalize_host(&raw_domain) {
            Some(domain) => domain,
            None => {
                debug!(raw = %raw_domain, "Skipping unusable site entry");
                continue;
            }
        };

        let rank = RANK_RE
            .captures(block)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .unwrap_or(first_rank + idx as u32);

        entries.push(SiteRankEntry { domain, rank });
    }

    Ok(entries)
}

/// Pull `(code, message)` out of an `<Errors>` document, if the body is one.
fn parse_error_document(body: &str) -> Option<(String, String)> {
    if !body.contains("Error>") {
        return None;
    }
    let code = ERROR_CODE_RE.captures(body)?[1].to_string();
    let message = ERROR_MESSAGE_RE
        .captures(body)
        .map(|caps| decode_xml_entities(&caps[1]))
        .unwrap_or_else(|| "no message".to_string());
    Some((code, message))
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Sort by rank, keep the best-ranked copy of each domain, cap at `limit`.
fn order_and_dedup(mut entries: Vec<SiteRankEntry>, limit: usize) -> Vec<SiteRankEntry> {
    entries.sort_by_key(|e| e.rank);
    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert(e.domain.clone()));
    entries.truncate(limit);
    entries
}

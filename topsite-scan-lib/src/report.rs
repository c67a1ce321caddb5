//! Aggregation of scan results into a report.
//!
//! Two timing figures are kept side by side. `wall_clock` is how long the
//! scan phase actually took. `sum_elapsed` adds up every request's own
//! duration; because requests overlap, it is normally much larger than the
//! wall clock and must never be presented as the scan duration. Their ratio
//! is reported as the effective parallelism.

use crate::types::{duration_ms, ScanOutcome, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default number of header names listed in the report.
pub const DEFAULT_TOP_HEADERS: usize = 20;

/// How common one response header is across the successfully scanned sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderStat {
    /// Lowercased header name
    pub name: String,
    /// Number of sites that sent it at least once
    pub sites: usize,
    /// `sites` as a percentage of successful scans
    pub percentage: f64,
}

/// Everything one run produced, plus the summary figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// One result per scanned domain, in input order
    pub results: Vec<ScanResult>,

    /// Real duration of the scan phase
    #[serde(with = "duration_ms")]
    pub wall_clock: Duration,

    /// Sum of every request's own elapsed time
    #[serde(with = "duration_ms")]
    pub sum_elapsed: Duration,

    pub success_count: usize,
    pub failure_count: usize,
    pub timeout_count: usize,
    pub connection_error_count: usize,
    pub decode_error_count: usize,

    /// Concurrency cap the scan ran with
    pub concurrency: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_word_count: Option<f64>,

    pub header_stats: Vec<HeaderStat>,
}

impl ScanReport {
    /// Aggregate a finished scan.
    ///
    /// Word-count ranks are assigned here, on the report's own copy of the
    /// results.
    pub fn build(
        mut results: Vec<ScanResult>,
        wall_clock: Duration,
        concurrency: usize,
        top_headers: usize,
    ) -> Self {
        assign_word_count_ranks(&mut results);

        let count = |outcome: ScanOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        let success_count = count(ScanOutcome::Success);
        let timeout_count = count(ScanOutcome::Timeout);
        let connection_error_count = count(ScanOutcome::ConnectionError);
        let decode_error_count = count(ScanOutcome::DecodeError);

        let sum_elapsed = results.iter().map(|r| r.elapsed).sum();

        let word_counts: Vec<usize> = results.iter().filter_map(|r| r.word_count).collect();
        let average_word_count = if word_counts.is_empty() {
            None
        } else {
            Some(word_counts.iter().sum::<usize>() as f64 / word_counts.len() as f64)
        };

        let header_stats = header_statistics(&results, top_headers);

        Self {
            failure_count: results.len() - success_count,
            results,
            wall_clock,
            sum_elapsed,
            success_count,
            timeout_count,
            connection_error_count,
            decode_error_count,
            concurrency,
            average_word_count,
            header_stats,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// `sum_elapsed / wall_clock`: how many requests were in flight on average.
    pub fn effective_parallelism(&self) -> Option<f64> {
        if self.wall_clock.is_zero() {
            None
        } else {
            Some(self.sum_elapsed.as_secs_f64() / self.wall_clock.as_secs_f64())
        }
    }

    /// Domains that ended with the given outcome, in input order.
    pub fn domains_with(&self, outcome: ScanOutcome) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.domain.clone())
            .collect()
    }

    /// Results that have a word count, best ranked first.
    pub fn by_word_count(&self) -> Vec<&ScanResult> {
        let mut ranked: Vec<&ScanResult> = self
            .results
            .iter()
            .filter(|r| r.word_count_rank.is_some())
            .collect();
        ranked.sort_by_key(|r| r.word_count_rank);
        ranked
    }
}

/// Rank results by word count, largest first; ties keep input order.
pub fn assign_word_count_ranks(results: &mut [ScanResult]) {
    let mut counted: Vec<(usize, usize)> = results
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.word_count.map(|wc| (idx, wc)))
        .collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    for result in results.iter_mut() {
        result.word_count_rank = None;
    }
    for (position, (idx, _)) in counted.into_iter().enumerate() {
        results[idx].word_count_rank = Some(position + 1);
    }
}

/// The `top` most common header names among successful results.
pub fn header_statistics(results: &[ScanResult], top: usize) -> Vec<HeaderStat> {
    let successes: Vec<&ScanResult> = results.iter().filter(|r| r.is_success()).collect();
    if successes.is_empty() || top == 0 {
        return Vec::new();
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for result in &successes {
        for name in result.header_names() {
            *seen.entry(name).or_insert(0) += 1;
        }
    }

    let mut stats: Vec<HeaderStat> = seen
        .into_iter()
        .map(|(name, sites)| HeaderStat {
            name,
            sites,
            percentage: sites as f64 * 100.0 / successes.len() as f64,
        })
        .collect();
    stats.sort_by(|a, b| b.sites.cmp(&a.sites).then_with(|| a.name.cmp(&b.name)));
    stats.truncate(top);
    stats
}

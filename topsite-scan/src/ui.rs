//! Report rendering for the topsite-scan CLI.
//!
//! Everything the user asked for goes to stdout; the spinner writes to
//! stderr so stdout stays clean for redirection.

use console::{pad_str, style, Alignment, StyledObject, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use topsite_scan_lib::{
    format_name_list, HeaderStat, ScanOutcome, ScanReport, ScanResult, Settings,
};

const DOMAIN_WIDTH: usize = 32;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner on stderr.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner, or return `None` when stderr is not a terminal.
    pub fn start(message: String) -> Option<Self> {
        if !Term::stderr().is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

pub fn print_header(site_count: usize, settings: &Settings) {
    println!(
        "{} {} {}",
        style("topsite-scan").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("- Scanning {} site{}", site_count, plural(site_count))).dim(),
    );

    let ranking = match &settings.ranking.country {
        Some(country) => format!("Ranking: {}", country),
        None => "Ranking: global".to_string(),
    };
    let meta_parts = [
        ranking,
        format!("Concurrency: {}", settings.scan.concurrency),
        format!("Timeout: {}", format_elapsed(settings.scan.timeout)),
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Result lines ─────────────────────────────────────────────────────────────

/// One line per scanned site: rank, domain, outcome and what we learned.
pub fn format_result_line(result: &ScanResult) -> String {
    let rank = match result.rank {
        Some(rank) => format!("{:>5}", format!("#{}", rank)),
        None => format!("{:>5}", "-"),
    };
    let padded = pad_str(&result.domain, DOMAIN_WIDTH, Alignment::Left, Some(".."));

    let detail = match result.outcome {
        ScanOutcome::Success => {
            let status = result
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_default();
            let words = match (result.word_count, result.word_count_rank) {
                (Some(count), Some(rank)) => format!("  {} words (#{})", count, rank),
                (Some(count), None) => format!("  {} words", count),
                _ => String::new(),
            };
            format!("{}{}", status, words)
        }
        _ => brief_error(result).to_string(),
    };

    format!(
        "  {} {}  {}  {:>8}  {}",
        style(rank).dim(),
        style(&padded).white(),
        outcome_label(result.outcome),
        format_elapsed(result.elapsed),
        style(detail).dim(),
    )
}

pub fn print_results(report: &ScanReport) {
    for result in &report.results {
        println!("{}", format_result_line(result));
    }
    println!();
}

fn outcome_label(outcome: ScanOutcome) -> StyledObject<String> {
    let label = pad_str(&outcome.to_string(), 15, Alignment::Left, None).into_owned();
    match outcome {
        ScanOutcome::Success => style(label).green().bold(),
        ScanOutcome::Timeout => style(label).yellow(),
        ScanOutcome::ConnectionError | ScanOutcome::DecodeError => style(label).red(),
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Counts plus both timing figures. The wall clock is the scan duration;
/// the summed request time is labelled as such and never used in its place.
pub fn summary_lines(report: &ScanReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} site{}  {}  {}  {}  {}",
        style(report.total()).bold(),
        plural(report.total()),
        style("|").dim(),
        style(format!("{} succeeded", report.success_count)).green(),
        style("|").dim(),
        style(format!("{} failed", report.failure_count)).red(),
    )];

    lines.push(format!(
        "Wall clock: {}  {}  Sum of request times: {}",
        style(format_elapsed(report.wall_clock)).bold(),
        style("|").dim(),
        format_elapsed(report.sum_elapsed),
    ));

    if let Some(parallelism) = report.effective_parallelism() {
        lines.push(format!(
            "Effective parallelism: {:.1}x (concurrency limit {})",
            parallelism, report.concurrency
        ));
    }

    if let Some(average) = report.average_word_count {
        lines.push(format!("Average word count: {:.0}", average));
    }

    lines
}

pub fn print_summary(report: &ScanReport) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    for line in summary_lines(report) {
        println!("  {}", line);
    }
}

/// Failed domains grouped by outcome.
pub fn print_failure_summary(report: &ScanReport) {
    if report.failure_count == 0 {
        return;
    }

    println!();
    println!("  {}", style("Some homepages could not be scanned:").yellow());

    let groups = [
        (ScanOutcome::Timeout, "timeout"),
        (ScanOutcome::ConnectionError, "connection error"),
        (ScanOutcome::DecodeError, "decode error"),
    ];
    for (outcome, label) in groups {
        let domains = report.domains_with(outcome);
        if domains.is_empty() {
            continue;
        }
        println!(
            "  {} {} {}{}: {}",
            style("•").dim(),
            domains.len(),
            label,
            plural(domains.len()),
            format_name_list(&domains, 5),
        );
    }
}

// ── Header statistics ────────────────────────────────────────────────────────

pub fn format_header_stat(stat: &HeaderStat) -> String {
    format!(
        "  {}  {:>4} site{}  {:>5.1}%",
        pad_str(&stat.name, 30, Alignment::Left, Some("..")),
        stat.sites,
        if stat.sites == 1 { " " } else { "s" },
        stat.percentage,
    )
}

pub fn print_header_stats(report: &ScanReport) {
    if report.header_stats.is_empty() {
        return;
    }

    println!();
    println!(
        "  {} {}",
        style(format!("── Top {} response headers ", report.header_stats.len())).bold(),
        style("─".repeat(28)).dim(),
    );
    for stat in &report.header_stats {
        println!("{}", format_header_stat(stat));
    }
}

// ── Whole report ─────────────────────────────────────────────────────────────

pub fn print_text_report(report: &ScanReport) {
    print_results(report);
    print_summary(report);
    print_failure_summary(report);
    print_header_stats(report);
}

pub fn print_json_report(report: &ScanReport) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Milliseconds under ten seconds, seconds with one decimal above.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(10) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Short reason for a failed result.
fn brief_error(result: &ScanResult) -> &'static str {
    match result.outcome {
        ScanOutcome::Success => "",
        ScanOutcome::Timeout => "(timeout)",
        ScanOutcome::DecodeError => "(undecodable body)",
        ScanOutcome::ConnectionError => match &result.error_message {
            Some(msg) => {
                let m = msg.to_lowercase();
                if m.contains("dns") || m.contains("resolve") {
                    "(dns error)"
                } else if m.contains("certificate") || m.contains("tls") {
                    "(tls error)"
                } else if m.contains("refused") {
                    "(connection refused)"
                } else {
                    "(connection error)"
                }
            }
            None => "(connection error)",
        },
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

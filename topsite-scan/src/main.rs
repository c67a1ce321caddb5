//! Topsite Scan CLI Application
//!
//! Fetches the top sites ranking with the given access keys, scans every
//! homepage concurrently and prints a report. Everything except the
//! credentials is configured through config files and `TSS_*` environment
//! variables.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use std::process;
use topsite_scan_lib::{
    load_env_config, ConfigManager, Credentials, OutputFormat, Settings, SiteAnalyzer,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for topsite-scan
#[derive(Parser, Debug)]
#[command(name = "topsite-scan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scan the homepages of the most visited sites")]
#[command(
    long_about = "Fetch the Alexa Top Sites ranking and scan every homepage concurrently.\n\nReports status codes, response headers, timing and word counts. Concurrency, timeouts, site count and output format come from topsite-scan.toml or TSS_* environment variables."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Access key id used to sign ranking requests
    #[arg(short = 'k', long = "aws-key-id", value_name = "KEY_ID")]
    pub aws_key_id: String,

    /// Secret access key used to sign ranking requests
    #[arg(short = 's', long = "aws-secret-key", value_name = "SECRET")]
    pub aws_secret_key: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve settings: defaults, then config files, then environment.
fn build_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let env_config = load_env_config();
    let settings = Settings::load(&ConfigManager::new(), &env_config)?;
    Ok(settings)
}

fn credentials_from(args: &Args) -> Credentials {
    Credentials::new(args.aws_key_id.clone(), args.aws_secret_key.clone())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings()?;
    debug!(
        concurrency = settings.scan.concurrency,
        timeout_ms = settings.scan.timeout.as_millis() as u64,
        count = settings.ranking.count,
        endpoint = %settings.ranking.endpoint,
        "Resolved settings"
    );
    let text_output = settings.output == OutputFormat::Text;

    let analyzer = SiteAnalyzer::new(
        credentials_from(&args),
        settings.ranking.clone(),
        settings.scan.clone(),
    )?;

    let spinner = ui::Spinner::start(format!(
        "Fetching top {} sites...",
        settings.ranking.count
    ));
    let ranking = analyzer.fetch_ranking().await;
    if let Some(spinner) = spinner {
        spinner.stop().await;
    }
    let entries = ranking?;

    if text_output {
        ui::print_header(entries.len(), &settings);
    }

    let spinner = ui::Spinner::start(format!("Scanning {} homepages...", entries.len()));
    let report = analyzer.scan_entries(&entries, settings.top_headers).await;
    if let Some(spinner) = spinner {
        spinner.stop().await;
    }

    match settings.output {
        OutputFormat::Text => ui::print_text_report(&report),
        OutputFormat::Json => ui::print_json_report(&report)?,
    }

    Ok(())
}

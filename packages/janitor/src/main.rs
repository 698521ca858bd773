use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use janitor::stores::{connect_documents, open_blob_store};
use janitor::{GarbageCollector, JanitorAppConfig, JanitorError, RunOptions, RunReport};

/// Delete course records, submissions, peer responses and media that lost
/// their parent.
///
/// Destructive by default: without --dry-run every orphan found is deleted.
#[derive(Debug, Parser)]
#[command(name = "janitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Analyse and report only; never delete.
    #[arg(long)]
    dry_run: bool,

    /// Also reclaim media objects no submission references.
    #[arg(long = "delete-s3")]
    delete_s3: bool,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Configuration file (overrides JANITOR_CONFIG).
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Extra blob key prefix to protect. Repeatable.
    #[arg(long = "protected-prefix", value_name = "PREFIX")]
    protected_prefixes: Vec<String>,
}

const EXIT_SCAN_FAILED: u8 = 1;
const EXIT_SETUP_FAILED: u8 = 2;

async fn build(cli: &Cli) -> anyhow::Result<GarbageCollector> {
    let mut config =
        JanitorAppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config
        .gc
        .protected_prefixes
        .extend(cli.protected_prefixes.iter().cloned());
    config.gc.validate().context("Invalid protected prefix")?;

    let documents = connect_documents(&config)
        .await
        .context("Failed to connect to the document store")?;
    let blobs = if cli.delete_s3 {
        Some(
            open_blob_store(&config.storage)
                .await
                .context("Failed to open the blob store")?,
        )
    } else {
        None
    };

    Ok(GarbageCollector::new(config.gc, documents, blobs))
}

fn print_report(report: &RunReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(body) => println!("{body}"),
            Err(e) => {
                warn!(error = %e, "Failed to serialise report, printing text");
                print!("{report}");
            }
        }
    } else {
        print!("{report}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let collector = match build(&cli).await {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Janitor setup failed");
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };

    if cli.dry_run {
        info!("Dry run: nothing will be deleted");
    } else {
        warn!(
            include_blobs = cli.delete_s3,
            "Apply mode: orphaned records will be deleted. Pass --dry-run to only report"
        );
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        include_blobs: cli.delete_s3,
    };
    match collector.run(options).await {
        Ok(report) => {
            print_report(&report, cli.json);
            ExitCode::SUCCESS
        }
        Err(aborted) => {
            print_report(&aborted.report, cli.json);
            eprintln!("error: {aborted}");
            match aborted.error {
                JanitorError::Scan(_) => ExitCode::from(EXIT_SCAN_FAILED),
                _ => ExitCode::from(EXIT_SETUP_FAILED),
            }
        }
    }
}

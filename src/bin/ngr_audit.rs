//! NGR Audit Tool
//!
//! Compares the NGR stored in the static dataset against prize-pool deltas
//! fetched from the live draw feed, and prints the reconciled attribution.
//!
//! Usage:
//!   cargo run --release --bin ngr_audit -- --dataset data/draws.json check --draws all
//!   cargo run --release --bin ngr_audit -- --dataset data/draws.json check --draws 61,62,63 --json
//!   cargo run --release --bin ngr_audit -- --dataset data/draws.json timeline --from 50

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drawyield_backend::config::{FetchSettings, ReconcileParams};
use drawyield_backend::feeds::{load_static_dataset, CancelToken, DrawApiClient, PrizeFetcher};
use drawyield_backend::models::DrawRange;
use drawyield_backend::reconcile::{
    DrawRecordStore, SanityChecker, SanityReport, SanityScope, SanityStatus, Timeline,
};

#[derive(Parser, Debug)]
#[command(name = "ngr_audit")]
#[command(about = "Audit stored draw NGR against prize-pool deltas")]
struct Cli {
    /// Path to the static draw dataset (JSON)
    #[arg(short, long, env = "STATIC_DRAWS_PATH", default_value = "data/draws.json")]
    dataset: PathBuf,

    /// Draw feed base URL
    #[arg(long, env = "DRAW_API_BASE", default_value = "https://api.drawyield.io/v1")]
    draw_api: String,

    /// Optional TOML file overriding reconciliation constants
    #[arg(long, env = "DRAWYIELD_PARAMS_PATH")]
    params: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Concurrent prize fetches
    #[arg(long, default_value = "10")]
    batch_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify stored vs calculated NGR per draw
    Check {
        /// "all" or a comma-separated list of draw numbers
        #[arg(short, long, default_value = "all")]
        draws: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the reconciled attribution for a draw range
    Timeline {
        #[arg(long)]
        from: Option<u64>,

        #[arg(long)]
        to: Option<u64>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let params = match &cli.params {
        Some(path) => ReconcileParams::from_toml_file(path)?,
        None => ReconcileParams::default(),
    };
    let rows = load_static_dataset(&cli.dataset)?;
    let settings = FetchSettings {
        request_timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        batch_size: cli.batch_size.max(1),
        ..FetchSettings::default()
    };
    let feed = Arc::new(DrawApiClient::new(cli.draw_api.clone())?);
    let fetcher = Arc::new(PrizeFetcher::new(feed, settings));
    let cancel = CancelToken::new();

    match cli.command {
        Commands::Check { draws, json } => {
            let scope: SanityScope = draws.parse()?;
            let checker = SanityChecker::new(fetcher, &rows, params);
            let report = checker.run(&scope, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Timeline { from, to, json } => {
            let range = DrawRange::new(from, to)?;
            let store = DrawRecordStore::from_static(&rows, &params);
            let needed: Vec<u64> = store
                .list_draws(range)
                .iter()
                .flat_map(|d| [d.draw_number, d.draw_number.saturating_sub(1)])
                .collect();
            let book = fetcher.fetch_many(needed, &cancel).await;
            let timeline = Timeline::build(store, &book, &params);
            let draws = timeline.range(range);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&draws).context("serialize timeline")?
                );
            } else {
                println!(
                    "{:>6}  {:<10}  {:<10}  {:>14}  {:>14}  {:>14}  {}",
                    "draw", "date", "source", "ngr", "total", "adjusted", "jackpot"
                );
                for d in &draws {
                    println!(
                        "{:>6}  {:<10}  {:<10}  {:>14.2}  {:>14.2}  {:>14.2}  {}",
                        d.draw_number,
                        d.date,
                        d.ngr_source.as_str(),
                        d.ngr_added,
                        d.total_ngr_contribution,
                        d.adjusted_ngr,
                        if d.jackpot_won { "won" } else { "" }
                    );
                }
                for (source, count) in timeline.source_breakdown() {
                    println!("{source}: {count}");
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &SanityReport) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));

    println!(
        "{:>6}  {:>14}  {:>14}  {:>8}  {:<12}",
        "draw", "stored", "calculated", "diff%", "status"
    );
    for r in &report.results {
        let status = match r.status {
            SanityStatus::Match => "match",
            SanityStatus::Close => "close",
            SanityStatus::Mismatch => "MISMATCH",
            SanityStatus::MissingData => "missing_data",
        };
        println!(
            "{:>6}  {:>14}  {:>14}  {:>8}  {:<12}  {}",
            r.draw_number,
            fmt(r.stored_total),
            fmt(r.calculated_ngr),
            fmt(r.difference_pct),
            status,
            r.note.as_deref().unwrap_or("")
        );
    }

    let s = &report.summary;
    println!(
        "\n{} draws: {} match, {} close, {} mismatch, {} missing data",
        s.total, s.matched, s.close, s.mismatch, s.missing_data
    );
}

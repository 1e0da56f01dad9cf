mod changelog;
mod config;
mod extract;
mod fetch;
mod htmltext;
mod merge;
mod persist;
mod reconcile;
mod record;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "svtrack", about = "Standards version tracker and reconciler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every tracked standard against its sources
    Run {
        /// Max rows to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Report planned changes without writing CSV, README, or snapshots
        #[arg(long)]
        dry_run: bool,
        /// Path to the standards CSV (default: standards.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Tracked standards table
    Overview {
        /// Filter by organization tag (W3C, ISO, IETF, OIDF, EU, HL)
        #[arg(short, long)]
        org: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Path to the standards CSV (default: standards.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { limit, dry_run, csv } => run(limit, dry_run, csv).await,
        Commands::Overview { org, json, csv } => overview(org.as_deref(), json, csv),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

async fn run(limit: Option<usize>, dry_run: bool, csv: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = Arc::new(config::RunContext::from_env(csv, dry_run));
    let mut records = record::load(&ctx.csv_path)
        .with_context(|| format!("loading {}", ctx.csv_path.display()))?;
    if records.is_empty() {
        println!("No records in {}.", ctx.csv_path.display());
        return Ok(());
    }

    // A limited run reconciles a prefix but writes the whole list back, so
    // untouched rows survive verbatim.
    let total = records.len();
    let tail = match limit {
        Some(n) if n < total => records.split_off(n),
        _ => Vec::new(),
    };

    println!("Reconciling {} of {} standards...", records.len(), total);
    let source: Arc<dyn fetch::PageSource> = Arc::new(fetch::HttpFetcher::new()?);
    let mut result = reconcile::run(Arc::clone(&ctx), source, records).await?;
    result.records.extend(tail);

    if dry_run {
        for e in &result.batch.entries {
            println!("[{}] {}: {}: {} -> {}", e.org, e.name, e.field, e.old, e.new);
        }
        if result.batch.entries.is_empty() {
            println!("No changes.");
        }
    } else {
        if result.csv_changed {
            record::write(&ctx.csv_path, &result.records)?;
        }
        result.batch.append_to_readme(&ctx.readme_path)?;
    }

    let s = &result.stats;
    println!(
        "Done: {} rows ({} changed, {} field updates, {} content diffs).",
        s.rows, s.rows_changed, s.field_changes, s.content_diffs
    );
    Ok(())
}

fn overview(org: Option<&str>, json: bool, csv: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = config::RunContext::from_env(csv, false);
    let records = record::load(&ctx.csv_path)
        .with_context(|| format!("loading {}", ctx.csv_path.display()))?;

    let rows: Vec<_> = records
        .iter()
        .filter(|r| org.map_or(true, |o| r.org_tag.eq_ignore_ascii_case(o)))
        .collect();
    if rows.is_empty() {
        println!("No standards found.");
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:>3} | {:<5} | {:<30} | {:<28} | {:<28}",
        "#", "Org", "Standard", "Stable", "Draft"
    );
    println!("{}", "-".repeat(106));
    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>3} | {:<5} | {:<30} | {:<28} | {:<28}",
            i + 1,
            r.org_tag,
            truncate(&r.name, 30),
            truncate(&r.stable_version, 28),
            truncate(&r.draft_version, 28)
        );
    }
    println!("\n{} standards tracked", rows.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

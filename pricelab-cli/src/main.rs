//! PriceLab CLI — vendor price-file ingestion and price-history queries.
//!
//! Commands:
//! - `ingest` — run a daily or reinstatement job for a processing date
//! - `probe` — show which read strategy a file would get
//! - `query` — read best, all, or history rows from the store
//! - `revoke` — clear the best flag for tickers at a date
//! - `config` — print the effective configuration as TOML

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use pricelab_core::query::{self, PriceQuery, QueryView};
use pricelab_core::reinstate::revoke_best;
use pricelab_core::{DateTickerIndex, IngestSummary, ParquetStore, PriceStore, RunKind};
use pricelab_runner::{probe, run_job, IngestConfig, JobRequest, StrategyChoice};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "pricelab",
    about = "PriceLab CLI — vendor price-record ingestion"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the vendor file for a processing date.
    Ingest {
        /// Which feed to process.
        #[arg(long, value_enum, default_value_t = KindArg::Daily)]
        kind: KindArg,

        /// Processing date (YYYY-MM-DD). Defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Input file. Skips pattern resolution in the input directory.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Read strategy: auto, streaming or bulk.
        #[arg(long)]
        strategy: Option<StrategyChoice>,

        /// Records per flush in streaming mode.
        #[arg(long)]
        threshold: Option<usize>,

        /// Store directory (overrides config).
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Input directory (overrides config).
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Run artifact directory (overrides config).
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },
    /// Show the strategy a file would be ingested with.
    Probe {
        file: PathBuf,

        /// Read strategy: auto, streaming or bulk.
        #[arg(long, default_value = "auto")]
        strategy: StrategyChoice,
    },
    /// Query stored price history.
    Query {
        /// Tickers to include.
        #[arg(required = true)]
        tickers: Vec<String>,

        /// First date (YYYY-MM-DD). Defaults to the end date.
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD). Defaults to today.
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = ViewArg::Best)]
        view: ViewArg,

        /// Store directory (overrides config).
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Print JSON lines instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Clear the best flag for tickers at a date.
    Revoke {
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        #[arg(required = true)]
        tickers: Vec<String>,

        /// Store directory (overrides config).
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Actually write (without this flag, only previews what would change).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Daily,
    Reinstatement,
}

impl From<KindArg> for RunKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Daily => RunKind::Daily,
            KindArg::Reinstatement => RunKind::Reinstatement,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Best,
    All,
    History,
}

impl From<ViewArg> for QueryView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Best => QueryView::Best,
            ViewArg::All => QueryView::All,
            ViewArg::History => QueryView::History,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            kind,
            date,
            file,
            strategy,
            threshold,
            store_dir,
            input_dir,
            artifacts_dir,
        } => {
            let mut config = config;
            if let Some(dir) = store_dir {
                config.store_dir = dir;
            }
            if let Some(dir) = input_dir {
                config.input_dir = dir;
            }
            if artifacts_dir.is_some() {
                config.artifacts_dir = artifacts_dir;
            }
            let mut request = JobRequest::new(date.unwrap_or_else(today), kind.into());
            request.input = file;
            request.strategy = strategy;
            request.flush_threshold = threshold;
            run_ingest(&config, &request)
        }
        Commands::Probe { file, strategy } => run_probe(&file, strategy),
        Commands::Query {
            tickers,
            start,
            end,
            view,
            store_dir,
            json,
        } => {
            let store = open_store(&config, store_dir)?;
            let query = PriceQuery::new(tickers, start, end, view.into(), today());
            run_query(&store, &query, json)
        }
        Commands::Revoke {
            date,
            tickers,
            store_dir,
            confirm,
        } => {
            let mut store = open_store(&config, store_dir)?;
            run_revoke(&mut store, date, tickers, confirm)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(IngestConfig::default()),
    }
}

fn open_store(config: &IngestConfig, store_dir: Option<PathBuf>) -> Result<ParquetStore> {
    let dir = store_dir.unwrap_or_else(|| config.store_dir.clone());
    ParquetStore::open(&dir).with_context(|| format!("failed to open store {}", dir.display()))
}

fn run_ingest(config: &IngestConfig, request: &JobRequest) -> Result<()> {
    let outcome = run_job(config, request)?;
    print_summary(&outcome.summary);
    println!("Run ID:     {}", outcome.artifact.run_id);
    println!("Strategy:   {}", outcome.artifact.strategy);
    if let Some(path) = outcome.artifact_path {
        println!("Artifact saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    println!("Accepted:   {}", summary.records_accepted);
    println!("Rejected:   {}", summary.records_rejected);
    for (rule, count) in &summary.rejected_by_rule {
        println!("  {:<18} {count}", rule.to_string());
    }
    println!("Batches:    {}", summary.batches_flushed);
    if summary.records_replaced > 0 {
        println!("Replaced:   {}", summary.records_replaced);
    }
    if summary.records_revoked > 0 {
        println!("Revoked:    {}", summary.records_revoked);
    }
}

fn run_probe(file: &Path, strategy: StrategyChoice) -> Result<()> {
    let report = probe::decide(file, strategy)
        .with_context(|| format!("failed to probe {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_query(store: &dyn PriceStore, query: &PriceQuery, json: bool) -> Result<()> {
    let rows = store.query(query)?;
    if json {
        for row in &rows {
            println!("{}", serde_json::to_string(row)?);
        }
        return Ok(());
    }
    if rows.is_empty() {
        println!(
            "No rows for {} between {} and {}",
            query.tickers.iter().cloned().collect::<Vec<_>>().join(","),
            query.start,
            query.end
        );
        return Ok(());
    }
    println!("{}", query::to_table(&rows)?);
    Ok(())
}

fn run_revoke(
    store: &mut dyn PriceStore,
    date: NaiveDate,
    tickers: Vec<String>,
    confirm: bool,
) -> Result<()> {
    let tickers: BTreeSet<String> = tickers.into_iter().map(|t| t.trim().to_string()).collect();
    if tickers.iter().any(String::is_empty) {
        bail!("tickers must not be empty");
    }

    if !confirm {
        let preview = PriceQuery::new(
            tickers.iter().cloned(),
            Some(date),
            Some(date),
            QueryView::Best,
            date,
        );
        let rows = store.query(&preview)?;
        println!(
            "Would revoke {} best row(s) at {date}. Re-run with --confirm.",
            rows.len()
        );
        return Ok(());
    }

    let index: DateTickerIndex = [(date, tickers)].into();
    let revoked = revoke_best(store, &index)?;
    info!(%date, revoked, "manual revocation");
    println!("Revoked {revoked} row(s) at {date}");
    Ok(())
}

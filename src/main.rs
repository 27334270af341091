use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use imdb_loader::config::{ConfigOverrides, ImportConfig, Intents};
use imdb_loader::pipeline;
use imdb_loader::telemetry::{init_tracing, LogOptions};
use imdb_loader::util::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "imdb-loader",
    version,
    about = "Fetch, unpack and bulk-load the IMDb TSV dumps into Postgres"
)]
struct Cli {
    /// Download the dataset archives
    #[arg(short = 'd', long)]
    download: bool,
    /// Decompress the downloaded archives
    #[arg(short = 'u', long)]
    unzip: bool,
    /// Empty the destination tables before parsing (only with -p)
    #[arg(short = 't', long)]
    truncate: bool,
    /// Parse the dumps into the database
    #[arg(short = 'p', long)]
    parse: bool,
    /// Same as -d -u -t -p
    #[arg(short = 'a', long)]
    all: bool,

    /// Optional override for the database URL
    #[arg(long)]
    db_url: Option<String>,
    /// Data rows per committed chunk (overrides TRANSACTION_PORTION)
    #[arg(long)]
    portion: Option<usize>,
    /// Working directory for archives and dumps (overrides DOWNLOAD_DIR)
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Comma-separated datasets in load order, e.g. title.basics,title.ratings
    #[arg(long)]
    datasets: Option<String>,
    /// Parse and route every row but write nothing. Updates only match rows
    /// inserted earlier in the same run, so ratings-only runs report them all
    /// as unmatched
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Write a JSON run summary to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn intents(&self) -> Intents {
        if self.all {
            return Intents::all();
        }
        Intents {
            download: self.download,
            unzip: self.unzip,
            truncate: self.truncate,
            parse: self.parse,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(LogOptions::from_env("info,sqlx=warn"))?;

    let cli = Cli::parse();
    let intents = cli.intents();
    if intents.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let config = ImportConfig::from_env(ConfigOverrides {
        database_url: cli.db_url.clone(),
        portion: cli.portion,
        work_dir: cli.dir.clone(),
        datasets: cli.datasets.clone(),
        dry_run: cli.dry_run,
    })
    .context("invalid configuration")?;
    info!(
        datasets = ?config.datasets,
        portion = config.portion,
        dir = %config.work_dir.display(),
        dry_run = config.dry_run,
        ?intents,
        "starting import"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("interrupt received; stopping at the next chunk or stage boundary");
            cancel.store(true, Ordering::SeqCst);
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("second interrupt; exiting without waiting");
                std::process::exit(130);
            }
        });
    }

    let summary = pipeline::run(&config, intents, cancel)
        .await
        .context("import failed")?;

    if let Some(path) = cli.report.as_deref() {
        let body = serde_json::to_vec_pretty(&summary)?;
        std::fs::write(path, body)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(report = %path.display(), "run summary written");
    }

    let rows: u64 = summary.loads.iter().map(|l| l.rows).sum();
    info!(files = summary.loads.len(), rows, "done");
    Ok(())
}

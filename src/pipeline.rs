//! One import run: fetch, unpack, then load every selected dataset in order.

use crate::config::{ImportConfig, Intents};
use crate::dataset::tables_for;
use crate::error::PipelineError;
use crate::load::{LoadDriver, LoadReport};
use crate::schema;
use crate::sources::{self, download, gunzip, SourceFile};
use crate::store::{DryRunStore, PgRecordStore, RecordStore};
use crate::util::db::Db;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub downloaded: Vec<PathBuf>,
    pub decompressed: Vec<PathBuf>,
    pub truncated: Vec<&'static str>,
    pub dry_run: bool,
    pub loads: Vec<LoadReport>,
}

/// Check that every stage's input exists before any stage runs, so a bad
/// invocation fails without side effects.
pub fn preflight(intents: Intents, sources: &[SourceFile]) -> Result<(), PipelineError> {
    for source in sources {
        if intents.unzip && !intents.download && !source.archive.is_file() {
            return Err(PipelineError::MissingInput(source.archive.clone()));
        }
        if intents.parse && !intents.unzip && !source.flat.is_file() {
            return Err(PipelineError::MissingInput(source.flat.clone()));
        }
    }
    Ok(())
}

/// Stop between stages and files once an interrupt was requested.
fn check_cancel(cancel: &AtomicBool, stage: &'static str) -> Result<(), PipelineError> {
    if cancel.load(Ordering::SeqCst) {
        warn!(stage, "run cancelled");
        return Err(PipelineError::Cancelled(stage));
    }
    Ok(())
}

pub async fn run(
    config: &ImportConfig,
    intents: Intents,
    cancel: Arc<AtomicBool>,
) -> Result<RunSummary, PipelineError> {
    config.prepare_work_dir()?;
    let sources = sources::resolve_all(&config.base_url, &config.datasets, &config.work_dir)?;
    preflight(intents, &sources)?;

    let mut summary = RunSummary {
        dry_run: config.dry_run,
        ..RunSummary::default()
    };

    if intents.download {
        let client = download::http_client()?;
        for source in &sources {
            check_cancel(&cancel, "download")?;
            info!(url = %source.url, "downloading");
            download::download(&client, &source.url, &source.archive, &cancel).await?;
            summary.downloaded.push(source.archive.clone());
        }
    }

    if intents.unzip {
        for source in &sources {
            check_cancel(&cancel, "unzip")?;
            let out = gunzip::gunzip_blocking(
                source.archive.clone(),
                Some(source.flat.clone()),
                true,
                cancel.clone(),
            )
            .await?;
            summary.decompressed.push(out);
        }
    }

    if !intents.parse {
        if intents.truncate {
            warn!("truncate requested without parse; tables left untouched");
        }
        return Ok(summary);
    }

    check_cancel(&cancel, "parse")?;
    if config.dry_run {
        let mut store = DryRunStore::default();
        load_all(&mut store, config, intents, &sources, cancel, &mut summary).await?;
        info!(
            inserts = store.inserts,
            updates = store.updates,
            commits = store.commits,
            "dry run finished; nothing was written"
        );
    } else {
        let db = Db::connect(&config.database_url, config.tuning)
            .await
            .map_err(PipelineError::Connect)?;
        let mut store = PgRecordStore::new(db.pool, config.upsert, config.tuning.prepared);
        load_all(&mut store, config, intents, &sources, cancel, &mut summary).await?;
    }
    Ok(summary)
}

/// Ensure tables, optionally empty them, then load each source file in the
/// configured order. The first failing file aborts the run; files loaded
/// before it stay loaded.
pub async fn load_all<S>(
    store: &mut S,
    config: &ImportConfig,
    intents: Intents,
    sources: &[SourceFile],
    cancel: Arc<AtomicBool>,
    summary: &mut RunSummary,
) -> Result<(), PipelineError>
where
    S: RecordStore + ?Sized,
{
    let tables = tables_for(&config.datasets);
    schema::ensure_schema(store, &tables)
        .await
        .map_err(PipelineError::Schema)?;

    if intents.truncates() {
        schema::truncate(store, &tables)
            .await
            .map_err(PipelineError::Schema)?;
        summary.truncated = tables.iter().map(|t| t.name).collect();
    }

    for source in sources {
        check_cancel(&cancel, "parse")?;
        let report = LoadDriver::new(&mut *store, config.portion)
            .with_reader_options(config.reader)
            .with_cancel_flag(cancel.clone())
            .load_path(source.dataset, &source.flat)
            .await?;
        summary.loads.push(report);
    }
    Ok(())
}

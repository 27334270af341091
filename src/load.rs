//! Chunked, transactional loading of one dump file.
//!
//! Per file: open a transaction, take row 1 as the header, route every data row
//! through the dataset's handlers and write the result straight into the open
//! transaction. After every `portion` data rows the transaction is committed
//! and a new one opened. End of stream always ends with one final commit, even
//! when the last chunk is empty, so a file of `R` data rows produces
//! `R / portion + 1` commits.
//!
//! A failed write rolls back the open chunk and ends the file; chunks committed
//! before it stay. Cancellation is only looked at right after a chunk commit.

use crate::dataset::{Dataset, DatasetHandler, WriteOperation};
use crate::error::{LoadError, ReadError};
use crate::store::RecordStore;
use crate::tsv::{Header, ReaderOptions, Row, TabularReader};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_PORTION: usize = 2000;

/// Outcome of loading one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub file: String,
    pub header: Vec<String>,
    /// Data rows seen, header excluded, malformed rows included.
    pub rows: u64,
    pub inserts: u64,
    pub updates: u64,
    /// Updates whose key matched nothing.
    pub unmatched_updates: u64,
    pub shape_errors: u64,
    pub malformed_rows: u64,
    pub commits: u64,
    pub elapsed_ms: u64,
}

pub struct LoadDriver<'s, S: RecordStore + ?Sized> {
    store: &'s mut S,
    portion: usize,
    reader: ReaderOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'s, S: RecordStore + ?Sized> LoadDriver<'s, S> {
    /// `portion` of zero is treated as one.
    pub fn new(store: &'s mut S, portion: usize) -> Self {
        Self {
            store,
            portion: portion.max(1),
            reader: ReaderOptions::default(),
            cancel: None,
        }
    }

    pub fn with_reader_options(mut self, reader: ReaderOptions) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Load a dump file from disk with the handlers of `dataset`.
    pub async fn load_path(&mut self, dataset: Dataset, path: &Path) -> Result<LoadReport, LoadError> {
        let file = path.display().to_string();
        let rows = TabularReader::open(path, self.reader).map_err(|source| LoadError::Read {
            file: file.clone(),
            source,
        })?;
        info!(file = %file, dataset = %dataset, portion = self.portion, "parsing");
        self.load(&file, dataset.handlers(), rows).await
    }

    pub async fn load<R: BufRead>(
        &mut self,
        file: &str,
        handlers: &[DatasetHandler],
        rows: TabularReader<R>,
    ) -> Result<LoadReport, LoadError> {
        let started = Instant::now();
        let mut report = LoadReport {
            file: file.to_string(),
            ..LoadReport::default()
        };

        self.store
            .begin()
            .await
            .map_err(|source| LoadError::Transaction {
                file: file.to_string(),
                source,
            })?;

        if let Err(err) = self.drive(handlers, rows, &mut report).await {
            if let Err(rollback_err) = self.store.rollback().await {
                warn!(file, error = %rollback_err, "rollback after failure also failed");
            }
            warn!(
                file,
                rows = report.rows,
                commits = report.commits,
                error = %err,
                "load stopped; earlier chunks stay committed"
            );
            return Err(err);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            file,
            rows = report.rows,
            inserts = report.inserts,
            updates = report.updates,
            unmatched_updates = report.unmatched_updates,
            shape_errors = report.shape_errors,
            malformed_rows = report.malformed_rows,
            commits = report.commits,
            elapsed_ms = report.elapsed_ms,
            "{} processed",
            report.rows
        );
        Ok(report)
    }

    async fn drive<R: BufRead>(
        &mut self,
        handlers: &[DatasetHandler],
        mut rows: TabularReader<R>,
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        let header = match rows.next() {
            Some(Ok(row)) => Header::from_row(&row),
            Some(Err(source)) => {
                return Err(LoadError::Read {
                    file: report.file.clone(),
                    source,
                })
            }
            None => {
                debug!(file = %report.file, "empty file, nothing to load");
                return self.commit(report).await;
            }
        };
        report.header = header.fields().to_vec();

        for item in rows {
            report.rows += 1;
            match item {
                Ok(row) => self.route(&header, handlers, &row, report).await?,
                Err(ReadError::MalformedRow { record, message }) => {
                    report.malformed_rows += 1;
                    debug!(file = %report.file, record, %message, "skipping malformed row");
                }
                Err(source) => {
                    return Err(LoadError::Read {
                        file: report.file.clone(),
                        source,
                    })
                }
            }

            if report.rows % self.portion as u64 == 0 {
                self.commit(report).await?;
                info!(file = %report.file, rows = report.rows, commits = report.commits, "chunk committed");
                if self.cancelled() {
                    return Err(LoadError::Cancelled {
                        file: report.file.clone(),
                        committed_rows: report.rows,
                    });
                }
                self.store
                    .begin()
                    .await
                    .map_err(|source| LoadError::Transaction {
                        file: report.file.clone(),
                        source,
                    })?;
            }
        }

        self.commit(report).await
    }

    async fn route(
        &mut self,
        header: &Header,
        handlers: &[DatasetHandler],
        row: &Row,
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        let mut misshapen = false;
        for handler in handlers {
            let op = match handler.emit(header, row) {
                Ok(op) => op,
                Err(err) => {
                    misshapen = true;
                    debug!(file = %report.file, row = report.rows, error = %err, "row shape mismatch");
                    continue;
                }
            };
            let affected = self
                .store
                .write(&op)
                .await
                .map_err(|source| LoadError::Write {
                    file: report.file.clone(),
                    row: report.rows,
                    source,
                })?;
            match op {
                WriteOperation::Insert { .. } => report.inserts += 1,
                WriteOperation::Update { .. } => {
                    report.updates += 1;
                    if affected == 0 {
                        report.unmatched_updates += 1;
                    }
                }
            }
        }
        if misshapen {
            report.shape_errors += 1;
        }
        Ok(())
    }

    async fn commit(&mut self, report: &mut LoadReport) -> Result<(), LoadError> {
        self.store
            .commit()
            .await
            .map_err(|source| LoadError::Transaction {
                file: report.file.clone(),
                source,
            })?;
        report.commits += 1;
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

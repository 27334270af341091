//! Error types for the ingest pipeline.
//!
//! Setup failures (`ConfigError`, `TransportError`, `DecompressionError`) stop the
//! whole run. `RowShapeError` and `ReadError::MalformedRow` are per-row and only
//! counted by the load driver. `StoreError` surfaces as `LoadError::Write` and
//! ends the file at the last committed chunk.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("working directory {} is not usable", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with http status {status}")]
    Status { url: String, status: u16 },

    #[error("download of {url} cancelled")]
    Cancelled { url: String },

    #[error("cannot derive a file name from {0}")]
    FileName(String),

    #[error("failed writing download to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DecompressionError {
    #[error("{} does not have the expected .gz extension", .0.display())]
    NotGzip(PathBuf),

    #[error("compressed file {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    #[error("a file already exists at {}", .0.display())]
    OutputExists(PathBuf),

    #[error("output location {} is not writable", .0.display())]
    OutputNotWritable(PathBuf),

    #[error("i/o error while decompressing into {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decompression of {} cancelled", .0.display())]
    Cancelled(PathBuf),

    #[error("decompression task aborted: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ReadError {
    /// The record could not be tokenized; the stream itself is still usable.
    #[error("malformed row at line {record}: {message}")]
    MalformedRow { record: u64, message: String },

    #[error("cannot open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read failure at record {record}")]
    Io {
        record: u64,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowShapeError {
    #[error("row has {found} fields, header declares {expected}")]
    FieldCount { expected: usize, found: usize },

    #[error("row has {found} fields, at least {needed} required")]
    TooShort { needed: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("table {0} is not part of the target schema")]
    UnknownTable(String),

    #[error("column {column} is not part of table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("no transaction is open")]
    NoTransaction,

    #[error("a transaction is already open")]
    TransactionOpen,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {file} failed")]
    Read {
        file: String,
        #[source]
        source: ReadError,
    },

    #[error("write for data row {row} of {file} failed")]
    Write {
        file: String,
        row: u64,
        #[source]
        source: StoreError,
    },

    #[error("transaction control for {file} failed")]
    Transaction {
        file: String,
        #[source]
        source: StoreError,
    },

    #[error("load of {file} cancelled after {committed_rows} committed rows")]
    Cancelled { file: String, committed_rows: u64 },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decompression(#[from] DecompressionError),

    #[error("required input {} is missing", .0.display())]
    MissingInput(PathBuf),

    #[error("cannot connect to the destination database")]
    Connect(#[source] sqlx::Error),

    #[error("schema operation failed")]
    Schema(#[source] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("run cancelled before the {0} stage")]
    Cancelled(&'static str),
}

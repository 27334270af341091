//! Run configuration, resolved once at startup and passed down explicitly.

use crate::dataset::Dataset;
use crate::error::ConfigError;
use crate::load::DEFAULT_PORTION;
use crate::sources::DEFAULT_BASE_URL;
use crate::tsv::ReaderOptions;
use crate::util::db::ConnectTuning;
use crate::util::env;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_WORK_DIR: &str = "exchange";

/// The four composable things a run can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intents {
    pub download: bool,
    pub unzip: bool,
    pub truncate: bool,
    pub parse: bool,
}

impl Intents {
    pub fn all() -> Self {
        Self {
            download: true,
            unzip: true,
            truncate: true,
            parse: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.download || self.unzip || self.truncate || self.parse)
    }

    /// Truncation only ever happens as part of a parse run.
    pub fn truncates(&self) -> bool {
        self.parse && self.truncate
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub portion: Option<usize>,
    pub work_dir: Option<PathBuf>,
    pub datasets: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub database_url: String,
    /// Data rows per committed chunk.
    pub portion: usize,
    pub work_dir: PathBuf,
    pub base_url: Url,
    pub datasets: Vec<Dataset>,
    /// Primary-key upsert instead of plain INSERT.
    pub upsert: bool,
    pub reader: ReaderOptions,
    pub tuning: ConnectTuning,
    pub dry_run: bool,
}

impl ImportConfig {
    /// Resolve from `.env`/process environment plus overrides.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        env::init_env();
        Self::resolve(env::env_opt, overrides)
    }

    /// Resolve against an arbitrary key lookup; blank values count as unset.
    pub fn resolve<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = overrides
            .database_url
            .filter(|v| !v.trim().is_empty())
            .or_else(|| get("DATABASE_URL"))
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let portion = match overrides.portion {
            Some(p) => p,
            None => parse_or("TRANSACTION_PORTION", get("TRANSACTION_PORTION"), DEFAULT_PORTION)?,
        };
        if portion == 0 {
            return Err(ConfigError::Invalid {
                key: "TRANSACTION_PORTION",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let work_dir = overrides
            .work_dir
            .or_else(|| get("DOWNLOAD_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

        let raw_base = get("IMDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&raw_base)?;

        let datasets = match overrides.datasets.or_else(|| get("IMDB_DATASETS")) {
            Some(raw) => parse_datasets(&raw)?,
            None => Dataset::DEFAULTS.to_vec(),
        };

        let tuning = ConnectTuning {
            max_connections: parse_or("DB_MAX_CONNS", get("DB_MAX_CONNS"), 2u32)?,
            prepared: flag_or("USE_PREPARED", get("USE_PREPARED"), true)?,
            fast_ingest: flag_or("FAST_INGEST", get("FAST_INGEST"), false)?,
        };

        Ok(Self {
            database_url,
            portion,
            work_dir,
            base_url,
            datasets,
            upsert: flag_or("IMDB_UPSERT", get("IMDB_UPSERT"), false)?,
            reader: ReaderOptions {
                quoting: flag_or("TSV_QUOTING", get("TSV_QUOTING"), true)?,
                ..ReaderOptions::default()
            },
            tuning,
            dry_run: overrides.dry_run,
        })
    }

    /// Create the working directory if needed and make sure it is writable.
    pub fn prepare_work_dir(&self) -> Result<(), ConfigError> {
        let fail = |source| ConfigError::WorkDir {
            path: self.work_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.work_dir).map_err(fail)?;
        let meta = std::fs::metadata(&self.work_dir).map_err(fail)?;
        if meta.permissions().readonly() {
            return Err(fail(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "directory is read-only",
            )));
        }
        Ok(())
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn flag_or(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => env::parse_flag(&value).ok_or_else(|| ConfigError::Invalid {
            key,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    // Url::join replaces the last segment unless the base ends in '/'.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ConfigError::Invalid {
        key: "IMDB_BASE_URL",
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_datasets(raw: &str) -> Result<Vec<Dataset>, ConfigError> {
    let mut out: Vec<Dataset> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let dataset = part.parse::<Dataset>().map_err(|reason| ConfigError::Invalid {
            key: "IMDB_DATASETS",
            value: raw.to_string(),
            reason,
        })?;
        if !out.contains(&dataset) {
            out.push(dataset);
        }
    }
    if out.is_empty() {
        return Err(ConfigError::Invalid {
            key: "IMDB_DATASETS",
            value: raw.to_string(),
            reason: "no dataset selected".to_string(),
        });
    }
    Ok(out)
}

//! Dataset identities and the handlers each one is loaded with.
//!
//! A file's handlers are chosen from its name alone. Adding a dataset means a
//! new variant here plus its table in `schema`; the load driver is untouched.

pub mod handler;

pub use handler::{DatasetHandler, WriteOperation};

use crate::schema::{self, TableSchema};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    TitleBasics,
    TitleRatings,
    NameBasics,
}

const TITLE_BASICS_HANDLERS: &[DatasetHandler] = &[DatasetHandler::PrimaryRecord { table: "title" }];

const TITLE_RATINGS_HANDLERS: &[DatasetHandler] = &[DatasetHandler::MeasurementOverlay {
    table: "title",
    key_column: "tconst",
    columns: ["averageRating", "numVotes"],
}];

const NAME_BASICS_HANDLERS: &[DatasetHandler] = &[DatasetHandler::PrimaryRecord { table: "name" }];

impl Dataset {
    pub const ALL: [Dataset; 3] = [
        Dataset::TitleBasics,
        Dataset::TitleRatings,
        Dataset::NameBasics,
    ];

    /// Loaded when nothing else is configured, in this order.
    pub const DEFAULTS: [Dataset; 2] = [Dataset::TitleBasics, Dataset::TitleRatings];

    pub fn stem(self) -> &'static str {
        match self {
            Dataset::TitleBasics => "title.basics",
            Dataset::TitleRatings => "title.ratings",
            Dataset::NameBasics => "name.basics",
        }
    }

    pub fn tsv_name(self) -> String {
        format!("{}.tsv", self.stem())
    }

    pub fn archive_name(self) -> String {
        format!("{}.tsv.gz", self.stem())
    }

    /// Identify a dataset from a file name such as `title.ratings.tsv`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".gz").unwrap_or(name);
        let stem = stem.strip_suffix(".tsv").unwrap_or(stem);
        Self::ALL.into_iter().find(|d| d.stem() == stem)
    }

    pub fn handlers(self) -> &'static [DatasetHandler] {
        match self {
            Dataset::TitleBasics => TITLE_BASICS_HANDLERS,
            Dataset::TitleRatings => TITLE_RATINGS_HANDLERS,
            Dataset::NameBasics => NAME_BASICS_HANDLERS,
        }
    }

    pub fn table(self) -> &'static TableSchema {
        match self {
            Dataset::TitleBasics | Dataset::TitleRatings => &schema::TITLE,
            Dataset::NameBasics => &schema::NAME,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_file_name(s.trim()).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|d| d.stem()).collect();
            format!("unknown dataset {s:?} (known: {})", known.join(", "))
        })
    }
}

/// Distinct destination tables for a dataset list, first use first.
pub fn tables_for(datasets: &[Dataset]) -> Vec<&'static TableSchema> {
    let mut out: Vec<&'static TableSchema> = Vec::new();
    for dataset in datasets {
        let table = dataset.table();
        if !out.iter().any(|t| t.name == table.name) {
            out.push(table);
        }
    }
    out
}

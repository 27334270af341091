//! Where each dataset comes from and where its files live locally.

pub mod download;
pub mod gunzip;

use crate::dataset::Dataset;
use crate::error::TransportError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://datasets.imdbws.com/";

/// Remote archive plus the two local paths derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub dataset: Dataset,
    pub url: Url,
    /// Downloaded `.gz` archive.
    pub archive: PathBuf,
    /// Decompressed dump the loader parses.
    pub flat: PathBuf,
}

impl SourceFile {
    pub fn resolve(base: &Url, dataset: Dataset, dir: &Path) -> Result<Self, TransportError> {
        let url = base
            .join(&dataset.archive_name())
            .map_err(|_| TransportError::FileName(format!("{base}{}", dataset.archive_name())))?;
        let archive_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TransportError::FileName(url.to_string()))?;
        let flat_name = archive_name
            .strip_suffix(".gz")
            .unwrap_or(&archive_name)
            .to_string();
        Ok(Self {
            dataset,
            archive: dir.join(&archive_name),
            flat: dir.join(flat_name),
            url,
        })
    }
}

/// Sibling `<path>.part` that a file is written to before it is renamed into
/// place, so a failed write never replaces a good file.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

pub fn resolve_all(
    base: &Url,
    datasets: &[Dataset],
    dir: &Path,
) -> Result<Vec<SourceFile>, TransportError> {
    datasets
        .iter()
        .map(|dataset| SourceFile::resolve(base, *dataset, dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_local_names_from_url_path() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let src = SourceFile::resolve(&base, Dataset::TitleBasics, Path::new("exchange")).unwrap();
        assert_eq!(
            src.url.as_str(),
            "https://datasets.imdbws.com/title.basics.tsv.gz"
        );
        assert_eq!(src.archive, Path::new("exchange/title.basics.tsv.gz"));
        assert_eq!(src.flat, Path::new("exchange/title.basics.tsv"));
    }

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path(Path::new("exchange/title.basics.tsv.gz")),
            Path::new("exchange/title.basics.tsv.gz.part")
        );
    }

    #[test]
    fn nested_base_paths_keep_a_flat_local_layout() {
        let base = Url::parse("http://mirror.local/imdb/2026-10/").unwrap();
        let all = resolve_all(&base, &Dataset::DEFAULTS, Path::new("/tmp/w")).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[1].url.as_str(),
            "http://mirror.local/imdb/2026-10/title.ratings.tsv.gz"
        );
        assert_eq!(all[1].archive, Path::new("/tmp/w/title.ratings.tsv.gz"));
        assert_eq!(all[1].dataset, Dataset::TitleRatings);
    }
}

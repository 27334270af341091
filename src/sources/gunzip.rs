use super::part_path;
use crate::error::DecompressionError;
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Decompress a single `.gz` file. Without an explicit `output` the `.gz`
/// suffix is dropped. The data is decoded into `<output>.part` and renamed over
/// `output` only once the whole archive decoded cleanly, so a corrupt or
/// cancelled archive leaves the previous dump untouched. `cancel` is checked
/// between chunks. Returns the written path.
pub fn gunzip(
    archive: &Path,
    output: Option<&Path>,
    allow_overwrite: bool,
    cancel: &AtomicBool,
) -> Result<PathBuf, DecompressionError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if !name.to_ascii_lowercase().ends_with(".gz") {
        return Err(DecompressionError::NotGzip(archive.to_path_buf()));
    }
    if !archive.is_file() {
        return Err(DecompressionError::SourceMissing(archive.to_path_buf()));
    }

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => archive.with_file_name(&name[..name.len() - 3]),
    };
    if output.exists() {
        if !allow_overwrite {
            return Err(DecompressionError::OutputExists(output));
        }
        let readonly = output
            .metadata()
            .map(|m| m.permissions().readonly())
            .unwrap_or(false);
        if readonly {
            return Err(DecompressionError::OutputNotWritable(output));
        }
    }

    let part = part_path(&output);
    let written = match decode_into(archive, &part, cancel) {
        Ok(written) => written,
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&part) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(part = %part.display(), error = %cleanup, "could not remove partial output");
                }
            }
            return Err(err);
        }
    };
    fs::rename(&part, &output).map_err(|source| DecompressionError::Io {
        path: output.clone(),
        source,
    })?;

    info!(
        archive = %archive.display(),
        output = %output.display(),
        bytes = written,
        "unpacked"
    );
    Ok(output)
}

fn decode_into(archive: &Path, part: &Path, cancel: &AtomicBool) -> Result<u64, DecompressionError> {
    let input = File::open(archive).map_err(|source| DecompressionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let out = File::create(part).map_err(|source| match source.kind() {
        io::ErrorKind::PermissionDenied => DecompressionError::OutputNotWritable(part.to_path_buf()),
        _ => DecompressionError::Io {
            path: part.to_path_buf(),
            source,
        },
    })?;

    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(READ_CHUNK, input));
    let mut writer = BufWriter::with_capacity(READ_CHUNK, out);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut written = 0u64;
    let io_err = |source| DecompressionError::Io {
        path: part.to_path_buf(),
        source,
    };
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(DecompressionError::Cancelled(archive.to_path_buf()));
        }
        let n = decoder.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(io_err)?;
        written += n as u64;
    }
    writer.flush().map_err(io_err)?;
    Ok(written)
}

/// Run `gunzip` off the async runtime.
pub async fn gunzip_blocking(
    archive: PathBuf,
    output: Option<PathBuf>,
    allow_overwrite: bool,
    cancel: Arc<AtomicBool>,
) -> Result<PathBuf, DecompressionError> {
    tokio::task::spawn_blocking(move || {
        gunzip(&archive, output.as_deref(), allow_overwrite, &cancel)
    })
    .await
    .map_err(|e| DecompressionError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    static RUNNING: AtomicBool = AtomicBool::new(false);

    fn write_gz(path: &Path, body: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(body).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn drops_gz_suffix_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("title.ratings.tsv.gz");
        write_gz(&archive, b"tconst\taverageRating\tnumVotes\ntt1\t8.5\t100\n");
        let out = gunzip(&archive, None, false, &RUNNING).unwrap();
        assert_eq!(out, dir.path().join("title.ratings.tsv"));
        assert_eq!(
            std::fs::read_to_string(out).unwrap(),
            "tconst\taverageRating\tnumVotes\ntt1\t8.5\t100\n"
        );
    }

    #[test]
    fn rejects_wrong_extension_and_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            gunzip(&dir.path().join("plain.tsv"), None, true, &RUNNING),
            Err(DecompressionError::NotGzip(_))
        ));
        assert!(matches!(
            gunzip(&dir.path().join("absent.tsv.GZ"), None, true, &RUNNING),
            Err(DecompressionError::SourceMissing(_))
        ));
    }

    #[test]
    fn overwrite_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("d.tsv.gz");
        write_gz(&archive, b"fresh");
        let target = dir.path().join("d.tsv");
        std::fs::write(&target, "stale").unwrap();

        assert!(matches!(
            gunzip(&archive, None, false, &RUNNING),
            Err(DecompressionError::OutputExists(_))
        ));
        gunzip(&archive, Some(&target), true, &RUNNING).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fresh");
    }

    #[test]
    fn concatenated_members_are_all_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("multi.tsv.gz");
        let mut bytes = Vec::new();
        for part in [&b"a\tb\n"[..], &b"1\t2\n"[..]] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
            enc.write_all(part).unwrap();
            bytes.extend(enc.finish().unwrap());
        }
        std::fs::write(&archive, bytes).unwrap();
        let out = gunzip(&archive, None, false, &RUNNING).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "a\tb\n1\t2\n");
    }

    #[tokio::test]
    async fn blocking_wrapper_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = gunzip_blocking(
            dir.path().join("none.gz"),
            None,
            true,
            Arc::new(AtomicBool::new(false)),
        )
            .await
            .unwrap_err();
        assert!(matches!(err, DecompressionError::SourceMissing(_)));
    }

    #[test]
    fn truncated_archive_keeps_previous_dump() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("title.ratings.tsv.gz");
        let body: String = (0..2000).map(|i| format!("tt{i}\t{}.0\t{i}\n", i % 10)).collect();
        write_gz(&archive, body.as_bytes());
        let full = std::fs::read(&archive).unwrap();
        std::fs::write(&archive, &full[..full.len() / 2]).unwrap();

        let target = dir.path().join("title.ratings.tsv");
        std::fs::write(&target, "tconst\taverageRating\tnumVotes\n").unwrap();

        let err = gunzip(&archive, None, true, &RUNNING).unwrap_err();
        assert!(matches!(err, DecompressionError::Io { .. }), "{err:?}");
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "tconst\taverageRating\tnumVotes\n"
        );
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn cancelled_decode_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("d.tsv.gz");
        write_gz(&archive, b"data");
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            gunzip(&archive, None, false, &cancel),
            Err(DecompressionError::Cancelled(_))
        ));
        assert!(!dir.path().join("d.tsv").exists());
        assert!(!part_path(&dir.path().join("d.tsv")).exists());
    }
}

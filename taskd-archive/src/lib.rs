//! Workspace archive transport (§4.5): pack a directory tree into a
//! gzip-compressed POSIX tar archive and unpack one back onto disk, rejecting
//! any entry that would escape the destination directory.

#![warn(missing_docs, clippy::pedantic)]

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use thiserror::Error;
use tracing::warn;

/// Errors from packing or unpacking a workspace archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O failure while reading the source tree, compressing, or writing output.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Packs every file under `source_dir` into a gzip-compressed tar archive,
/// with entry paths relative to `source_dir`.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] if `source_dir` cannot be walked or the
/// resulting bytes cannot be written to the in-memory buffer.
pub fn pack(source_dir: &Path) -> ArchiveResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.append_dir_all(".", source_dir)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Extracts a gzip-compressed tar archive produced by [`pack`] into `dest_dir`,
/// creating it if necessary.
///
/// Entries whose path is absolute or contains a `..` component are rejected
/// and skipped rather than aborting the whole extraction, matching the
/// registry-pack extraction this is modeled on.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] if the archive is corrupt or `dest_dir`
/// cannot be created.
pub fn unpack(archive_bytes: &[u8], dest_dir: &Path) -> ArchiveResult<()> {
    fs::create_dir_all(dest_dir)?;

    let gz = GzDecoder::new(archive_bytes);
    let mut archive = Archive::new(gz);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if !is_safe_relative_path(&entry_path) {
            warn!(path = %entry_path.display(), "rejected unsafe path in workspace archive");
            continue;
        }

        let out_path = dest_dir.join(&entry_path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&out_path)?;
        }
    }

    Ok(())
}

fn is_safe_relative_path(path: &Path) -> bool {
    !path.is_absolute() && !path.components().any(|c| c.as_os_str() == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn round_trips_nested_directory_contents() {
        let src = tempfile::tempdir().unwrap();
        write_file(src.path(), "a.txt", "hello");
        write_file(src.path(), "nested/b.txt", "world");

        let bytes = pack(src.path()).unwrap();

        let dest = tempfile::tempdir().unwrap();
        unpack(&bytes, dest.path()).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "hello");
        assert_eq!(
            fs::read_to_string(dest.path().join("nested/b.txt")).unwrap(),
            "world"
        );
    }

    #[test]
    fn rejects_path_traversal_entries() {
        let inner = Vec::new();
        let encoder = GzEncoder::new(inner, Compression::default());
        let mut builder = Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        let data = b"evil";
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, "../escape.txt", &data[..])
            .unwrap();
        let encoder = builder.into_inner().unwrap();
        let bytes = encoder.finish().unwrap();

        let dest = tempfile::tempdir().unwrap();
        unpack(&bytes, dest.path()).unwrap();

        assert!(!dest.path().join("../escape.txt").exists());
        assert!(fs::read_dir(dest.path()).unwrap().next().is_none());
    }

    #[test]
    fn is_safe_relative_path_rejects_absolute_and_dotdot() {
        assert!(is_safe_relative_path(Path::new("a/b.txt")));
        assert!(!is_safe_relative_path(Path::new("/etc/passwd")));
        assert!(!is_safe_relative_path(Path::new("../escape.txt")));
    }
}

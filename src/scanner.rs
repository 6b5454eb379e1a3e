//! The Filesystem Scanner (§4.B). Grounded in the teacher's
//! `repo::filesystem::FileWalker`: walk with `ignore::WalkBuilder`, hash
//! in parallel with `rayon`, return a value snapshot — no locks, no open
//! handles held past this call (§5).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::ScannerError;
use crate::models::ScannedFile;

const HASH_BLOCK_SIZE: usize = 64 * 1024;

pub struct FilesystemScanner;

impl FilesystemScanner {
    /// Walks `tenant_root`, returning one `ScannedFile` per regular file.
    /// Hidden files and out-of-root symlinks are skipped; unreadable
    /// individual files are logged and skipped rather than failing the
    /// whole scan. An unreadable root is a hard `ScannerError`.
    pub fn scan(tenant_root: &Path) -> Result<Vec<ScannedFile>, ScannerError> {
        let metadata = std::fs::metadata(tenant_root).map_err(|source| ScannerError::RootUnreadable {
            path: tenant_root.display().to_string(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScannerError::RootUnreadable {
                path: tenant_root.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            });
        }

        let walker = WalkBuilder::new(tenant_root)
            .standard_filters(true)
            .hidden(true)
            .filter_entry(|entry| !is_hidden(entry))
            .build();

        let paths: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .map(|entry| entry.into_path())
            .collect();

        let scanned: Vec<ScannedFile> = paths
            .into_par_iter()
            .filter_map(|path| scan_one(tenant_root, &path))
            .collect();

        Ok(scanned)
    }
}

fn is_hidden(entry: &ignore::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.') && s != ".")
        .unwrap_or(false)
}

fn scan_one(root: &Path, path: &Path) -> Option<ScannedFile> {
    let metadata = std::fs::metadata(path).ok()?;
    let content_hash = hash_file(path).ok()?;
    let relative_path = path
        .strip_prefix(root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    Some(ScannedFile {
        relative_path,
        size_bytes: metadata.len() as i64,
        content_hash,
    })
}

/// SHA-256 over raw bytes, streamed in fixed-size blocks so the full file
/// is never loaded into memory at once (§4.B).
fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BLOCK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_regular_files_with_stable_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("doc1.txt"), b"hello world").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/doc2.txt"), b"nested").unwrap();
        fs::write(dir.path().join(".hidden"), b"skip me").unwrap();

        let mut files = FilesystemScanner::scan(dir.path()).unwrap();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, "doc1.txt");
        assert_eq!(files[1].relative_path, "sub/doc2.txt");
        assert_eq!(files[0].size_bytes, 11);
    }

    #[test]
    fn content_hash_is_stable_sha256() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let files = FilesystemScanner::scan(dir.path()).unwrap();
        assert_eq!(
            files[0].content_hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn unreadable_root_is_a_scanner_error() {
        let err = FilesystemScanner::scan(Path::new("/nonexistent/path/xyz")).unwrap_err();
        assert!(matches!(err, ScannerError::RootUnreadable { .. }));
    }
}

//! Writing forged buffers back to disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),
}

impl OutputError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the whole content lands at `path` or the previous file is left
/// untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), OutputError> {
    // Same directory keeps the rename on one filesystem.
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(OutputError::NoParent(path.to_path_buf())),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(OutputError::io(path))?;
    temp.write_all(content).map_err(OutputError::io(path))?;
    temp.as_file().sync_all().map_err(OutputError::io(path))?;
    temp.persist(path)
        .map_err(|e| OutputError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

/// Write `content` to `path` and give it the modification time of `like`.
pub fn write_preserving_mtime(path: &Path, content: &[u8], like: &Path) -> Result<(), OutputError> {
    let metadata = std::fs::metadata(like).map_err(OutputError::io(like))?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    atomic_write(path, content)?;
    filetime::set_file_mtime(path, mtime).map_err(OutputError::io(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("out.bin");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, &[0xDE, 0xAD]).unwrap();
        assert_eq!(fs::read(&file_path).unwrap(), vec![0xDE, 0xAD]);
    }

    #[test]
    fn test_atomic_write_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("missing").join("out.bin");
        assert!(matches!(
            atomic_write(&file_path, b"x"),
            Err(OutputError::Io { .. })
        ));
    }

    #[test]
    fn test_write_preserving_mtime() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("source.bin");
        let output = temp_dir.path().join("forged.bin");
        fs::write(&source, b"abc").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&source, old).unwrap();

        write_preserving_mtime(&output, b"abd", &source).unwrap();

        let metadata = fs::metadata(&output).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&metadata), old);
        assert_eq!(fs::read(&output).unwrap(), b"abd");
    }
}

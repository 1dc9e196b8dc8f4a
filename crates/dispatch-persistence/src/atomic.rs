//! Atomic file operations for crash-safe persistence.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{PersistenceError, Result};

/// Ensure `dir` exists, creating it and its parents if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Write `data` to `path` through a temp file in the same directory.
///
/// The target is either absent or complete; it is never partially written.
/// With `overwrite = false` the final step is a no-clobber link, so two
/// writers racing for the same path cannot both succeed.
pub fn atomic_write(path: &Path, data: &[u8], overwrite: bool) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;

    let write_err = |source| PersistenceError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp_file.write_all(data).map_err(write_err)?;
    temp_file.as_file().sync_all().map_err(write_err)?;

    if overwrite {
        temp_file.persist(path).map_err(|e| write_err(e.error))?;
    } else {
        temp_file.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                PersistenceError::AlreadyExists {
                    kind: "file".to_string(),
                    id: path.display().to_string(),
                }
            } else {
                write_err(e.error)
            }
        })?;
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(
    path: &Path,
    value: &T,
    overwrite: bool,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes(), overwrite)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|source| PersistenceError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&data)?)
}

/// Read a JSON file, returning `None` if it does not exist.
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: i32,
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/out.txt");

        atomic_write(&path, b"nested content", false).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "nested content");
    }

    #[test]
    fn test_noclobber_refuses_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("once.txt");

        atomic_write(&path, b"first", false).unwrap();
        let err = atomic_write(&path, b"second", false).unwrap_err();

        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn test_overwrite_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.txt");

        atomic_write(&path, b"first", true).unwrap();
        atomic_write(&path, b"second", true).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_read_json_optional() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        let missing: Option<Sample> = read_json_optional(&path).unwrap();
        assert!(missing.is_none());

        let sample = Sample {
            name: "x".into(),
            value: 7,
        };
        atomic_write_json(&path, &sample, false).unwrap();

        let loaded: Option<Sample> = read_json_optional(&path).unwrap();
        assert_eq!(loaded, Some(sample));
    }
}

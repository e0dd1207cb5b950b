//! Durable per-job marker files in the working directory.
//!
//! A marker named `<handle>.<ext>` records that a job was submitted and its
//! resources are not yet all on disk. The file content is the originating
//! request URI followed by a newline. Markers survive restarts, so a fresh
//! process can pick up where a crashed one stopped.
//!
//! The store also writes the per-cycle audit log listing the handles that were
//! fully resolved (`download_<YYYY-mm-ddTHHMMSS>.uuids`).

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::{JobHandle, Request};

/// Default marker file extension.
pub const DEFAULT_MARKER_EXT: &str = "uuid";

/// Errors produced by the marker store.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// I/O error on a marker or audit log file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Handle cannot be used as a file name.
    #[error("job handle {handle:?} is not a valid marker name")]
    InvalidHandle {
        /// The rejected handle.
        handle: String,
    },
}

impl MarkerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid handle error.
    pub fn invalid_handle(handle: impl Into<String>) -> Self {
        Self::InvalidHandle {
            handle: handle.into(),
        }
    }
}

/// Marker store rooted at a directory.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
    ext: String,
}

impl MarkerStore {
    /// Creates a store using the default `uuid` extension.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, DEFAULT_MARKER_EXT)
    }

    /// Creates a store with a custom extension (without the leading dot).
    pub fn with_extension(dir: impl Into<PathBuf>, ext: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ext: ext.into().trim_start_matches('.').to_string(),
        }
    }

    /// Directory holding the markers.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the marker for `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::InvalidHandle`] if the handle is not a single
    /// safe path component.
    pub fn path_for(&self, handle: &JobHandle) -> Result<PathBuf, MarkerError> {
        validate_handle(handle.as_str())?;
        Ok(self.dir.join(format!("{}.{}", handle.as_str(), self.ext)))
    }

    /// Writes the marker for `handle`, flushed and synced before returning.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] on an invalid handle or an I/O failure.
    #[instrument(level = "debug", skip(self, request), fields(handle = %handle))]
    pub fn put(&self, handle: &JobHandle, request: &Request) -> Result<PathBuf, MarkerError> {
        let path = self.path_for(handle)?;
        fs::create_dir_all(&self.dir).map_err(|e| MarkerError::io(&self.dir, e))?;

        let mut file = fs::File::create(&path).map_err(|e| MarkerError::io(&path, e))?;
        file.write_all(request.uri().as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all())
            .map_err(|e| MarkerError::io(&path, e))?;

        debug!(path = %path.display(), "marker written");
        Ok(path)
    }

    /// Reads the request recorded for `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] on an invalid handle or a missing/unreadable file.
    pub fn read(&self, handle: &JobHandle) -> Result<Request, MarkerError> {
        let path = self.path_for(handle)?;
        let content = fs::read_to_string(&path).map_err(|e| MarkerError::io(&path, e))?;
        Ok(Request::new(content.trim_end()))
    }

    /// Lists every handle with a marker on disk, sorted.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::Io`] if the directory cannot be read.
    pub fn scan(&self) -> Result<Vec<JobHandle>, MarkerError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(MarkerError::io(&self.dir, err)),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MarkerError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.ext.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "skipping marker with non UTF-8 name");
                continue;
            };
            if validate_handle(stem).is_ok() {
                handles.push(JobHandle::new(stem));
            }
        }

        handles.sort();
        debug!(count = handles.len(), dir = %self.dir.display(), "markers scanned");
        Ok(handles)
    }

    /// Removes the marker for `handle`. Absent markers are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] on an invalid handle or an I/O failure other
    /// than not-found.
    pub fn delete(&self, handle: &JobHandle) -> Result<(), MarkerError> {
        let path = self.path_for(handle)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "marker deleted");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MarkerError::io(&path, err)),
        }
    }

    /// Writes the audit log for handles resolved in one cycle.
    ///
    /// Returns `None` without touching disk when `handles` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::Io`] if the log cannot be written.
    pub fn write_audit_log(&self, handles: &[JobHandle]) -> Result<Option<PathBuf>, MarkerError> {
        if handles.is_empty() {
            return Ok(None);
        }

        let name = format!("download_{}.uuids", Local::now().format("%Y-%m-%dT%H%M%S"));
        let path = self.dir.join(name);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MarkerError::io(&path, e))?;
        for handle in handles {
            writeln!(file, "{handle}").map_err(|e| MarkerError::io(&path, e))?;
        }
        file.flush().map_err(|e| MarkerError::io(&path, e))?;

        info!(path = %path.display(), count = handles.len(), "audit log written");
        Ok(Some(path))
    }
}

fn validate_handle(handle: &str) -> Result<(), MarkerError> {
    let unsafe_name = handle.is_empty()
        || handle == "."
        || handle == ".."
        || handle.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(MarkerError::invalid_handle(handle));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_put_writes_uri_with_newline() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        let handle = JobHandle::new("abc-123");

        let path = store
            .put(&handle, &Request::new("https://h/api/v2/x?a=1"))
            .unwrap();

        assert_eq!(path, dir.path().join("abc-123.uuid"));
        assert_eq!(fs::read_to_string(path).unwrap(), "https://h/api/v2/x?a=1\n");
        assert_eq!(store.read(&handle).unwrap().uri(), "https://h/api/v2/x?a=1");
    }

    #[test]
    fn test_scan_returns_sorted_handles_with_matching_extension() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        store.put(&JobHandle::new("b"), &Request::new("u")).unwrap();
        store.put(&JobHandle::new("a"), &Request::new("u")).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("download_2024-01-01T000000.uuids"), "a\n").unwrap();

        let handles = store.scan().unwrap();
        assert_eq!(handles, vec![JobHandle::new("a"), JobHandle::new("b")]);
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path().join("nope"));
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        let handle = JobHandle::new("abc");
        store.put(&handle, &Request::new("u")).unwrap();

        store.delete(&handle).unwrap();
        store.delete(&handle).unwrap();
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_handles_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            let result = store.put(&JobHandle::new(bad), &Request::new("u"));
            assert!(
                matches!(result, Err(MarkerError::InvalidHandle { .. })),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_custom_extension() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::with_extension(dir.path(), ".job");
        store.put(&JobHandle::new("x"), &Request::new("u")).unwrap();
        assert!(dir.path().join("x.job").exists());
        assert_eq!(store.scan().unwrap(), vec![JobHandle::new("x")]);
    }

    #[test]
    fn test_audit_log_lists_handles() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        let path = store
            .write_audit_log(&[JobHandle::new("a"), JobHandle::new("b")])
            .unwrap()
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("download_"));
        assert!(name.ends_with(".uuids"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_audit_log_skipped_when_empty() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path());
        assert!(store.write_audit_log(&[]).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

//! Where the progress blob lives.

use super::ProgressError;
use std::path::{Path, PathBuf};

pub trait ProgressBackend {
    /// The stored blob, or `None` if nothing was saved yet.
    fn load(&mut self) -> Result<Option<String>, ProgressError>;
    fn save(&mut self, blob: &str) -> Result<(), ProgressError>;
}

/// Keeps the blob in memory; used by tests and one-shot tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blob: Option<String>,
    saves: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
            saves: 0,
        }
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl ProgressBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<String>, ProgressError> {
        Ok(self.blob.clone())
    }

    fn save(&mut self, blob: &str) -> Result<(), ProgressError> {
        self.blob = Some(blob.to_string());
        self.saves += 1;
        Ok(())
    }
}

/// One JSON file on disk, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressBackend for JsonFileBackend {
    fn load(&mut self) -> Result<Option<String>, ProgressError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProgressError::Io(e)),
        }
    }

    fn save(&mut self, blob: &str) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ProgressError::Io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, blob).map_err(ProgressError::Io)?;
        std::fs::rename(&tmp, &self.path).map_err(ProgressError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trips() {
        let mut backend = MemoryBackend::new();
        assert_eq!(backend.load().unwrap(), None);

        backend.save("{}").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some("{}"));
        assert_eq!(backend.saves(), 1);
    }

    #[test]
    fn file_backend_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = JsonFileBackend::new(dir.path().join("progress.json"));
        assert_eq!(backend.load().unwrap(), None);
    }

    #[test]
    fn file_backend_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/progress.json");
        let mut backend = JsonFileBackend::new(&path);

        backend.save(r#"{"modules":{}}"#).unwrap();
        backend.save(r#"{"modules":{},"schemaVersion":2}"#).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"modules":{},"schemaVersion":2}"#
        );
        assert!(!path.with_extension("json.tmp").exists());
    }
}

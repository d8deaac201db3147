//! JSON persistence for device-local state.

use platter_core::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A JSON document stored at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: PathBuf,
    what: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonFile<T> {
    pub fn new(path: impl Into<PathBuf>, what: &'static str) -> Self {
        Self {
            path: path.into(),
            what,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<T>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.failed(e))?;
        let value = serde_json::from_str::<T>(&contents).map_err(|e| StorageError::Corrupt {
            what: self.what.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    pub fn save(&self, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.failed(e))?;
        }
        let contents = serde_json::to_string_pretty(value).map_err(|e| self.failed(e))?;
        std::fs::write(&self.path, contents).map_err(|e| self.failed(e))?;
        Ok(())
    }

    /// Delete the file. Missing files are not an error.
    pub fn remove(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.failed(e)),
        }
    }

    fn failed(&self, err: impl std::fmt::Display) -> StorageError {
        StorageError::PersistenceFailed {
            what: self.what.to_string(),
            reason: format!("{}: {}", self.path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Vec<u32>> = JsonFile::new(dir.path().join("nested/list.json"), "list");
        assert_eq!(file.load().unwrap(), None);
        file.save(&vec![1, 2, 3]).unwrap();
        assert_eq!(file.load().unwrap(), Some(vec![1, 2, 3]));
        file.remove().unwrap();
        file.remove().unwrap();
        assert_eq!(file.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let file: JsonFile<Vec<u32>> = JsonFile::new(path, "list");
        assert!(matches!(file.load(), Err(StorageError::Corrupt { .. })));
    }
}

//! Journal of ratings made from this device.
//!
//! Lets the engine answer "has this device already rated X" without a
//! network round trip. Bounded to the most recent entries across all
//! resources and persisted next to the device id.

use platter_core::{EngineResult, Rating, ResourceId, ResourceKind, StorageError, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

use crate::persistence::JsonFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRating {
    pub kind: ResourceKind,
    pub resource_id: ResourceId,
    pub rating_id: String,
    pub rating: u8,
    pub rated_at: Timestamp,
}

pub struct LocalRatings {
    cap: usize,
    entries: RwLock<Vec<LocalRating>>,
    file: Option<JsonFile<Vec<LocalRating>>>,
}

impl LocalRatings {
    pub const FILE_NAME: &'static str = "local_ratings.json";

    pub fn in_memory(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            entries: RwLock::new(Vec::new()),
            file: None,
        }
    }

    /// Open the journal stored at `path`. An unreadable journal starts
    /// empty rather than failing.
    pub fn open(path: impl Into<PathBuf>, cap: usize) -> Self {
        let file = JsonFile::new(path, "local ratings");
        let mut entries = match file.load() {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "local ratings unreadable, starting empty");
                Vec::new()
            }
        };
        let cap = cap.max(1);
        entries.truncate(cap);
        Self {
            cap,
            entries: RwLock::new(entries),
            file: Some(file),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>, cap: usize) -> Self {
        Self::open(dir.into().join(Self::FILE_NAME), cap)
    }

    /// Record a rating made from this device. Replaces an earlier entry for
    /// the same resource and drops the oldest entries beyond the cap.
    pub fn record(&self, kind: ResourceKind, rating: &Rating) -> EngineResult<()> {
        let snapshot = {
            let mut entries = self.entries.write().map_err(|_| StorageError::poisoned("local ratings"))?;
            entries.retain(|e| !(e.kind == kind && e.resource_id == rating.resource_id));
            entries.insert(
                0,
                LocalRating {
                    kind,
                    resource_id: rating.resource_id.clone(),
                    rating_id: rating.id.clone(),
                    rating: rating.rating,
                    rated_at: rating.timestamp,
                },
            );
            entries.truncate(self.cap);
            entries.clone()
        };
        self.persist(&snapshot);
        Ok(())
    }

    pub fn has_rated(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        Ok(self.local_rating(kind, resource_id)?.is_some())
    }

    pub fn local_rating(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<Option<LocalRating>> {
        let entries = self.entries.read().map_err(|_| StorageError::poisoned("local ratings"))?;
        Ok(entries
            .iter()
            .find(|e| e.kind == kind && &e.resource_id == resource_id)
            .cloned())
    }

    /// Newest first.
    pub fn entries(&self) -> EngineResult<Vec<LocalRating>> {
        Ok(self.entries.read().map_err(|_| StorageError::poisoned("local ratings"))?.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> EngineResult<()> {
        self.entries.write().map_err(|_| StorageError::poisoned("local ratings"))?.clear();
        if let Some(file) = &self.file {
            file.remove()?;
        }
        Ok(())
    }

    fn persist(&self, entries: &Vec<LocalRating>) {
        if let Some(file) = &self.file {
            if let Err(err) = file.save(entries) {
                warn!(error = %err, "could not persist local ratings");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use platter_test_utils::rating_fixture;

    #[test]
    fn test_record_and_query() {
        let journal = LocalRatings::in_memory(100);
        let d1 = ResourceId::from("d1");
        assert!(!journal.has_rated(ResourceKind::Dish, &d1).unwrap());

        journal.record(ResourceKind::Dish, &rating_fixture("r1", &d1, 4)).unwrap();
        assert!(journal.has_rated(ResourceKind::Dish, &d1).unwrap());
        assert!(!journal.has_rated(ResourceKind::Restaurant, &d1).unwrap());
        assert_eq!(
            journal.local_rating(ResourceKind::Dish, &d1).unwrap().unwrap().rating_id,
            "r1"
        );
    }

    #[test]
    fn test_rerating_replaces_entry() {
        let journal = LocalRatings::in_memory(100);
        let d1 = ResourceId::from("d1");
        journal.record(ResourceKind::Dish, &rating_fixture("r1", &d1, 2)).unwrap();
        journal.record(ResourceKind::Dish, &rating_fixture("r2", &d1, 5)).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.local_rating(ResourceKind::Dish, &d1).unwrap().unwrap().rating, 5);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let journal = LocalRatings::in_memory(3);
        for i in 0..5 {
            let id = ResourceId::new(format!("d{i}"));
            journal
                .record(ResourceKind::Dish, &rating_fixture(&format!("r{i}"), &id, 3))
                .unwrap();
        }
        let ids: Vec<String> = journal
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.rating_id)
            .collect();
        assert_eq!(ids, vec!["r4", "r3", "r2"]);
    }

    #[test]
    fn test_persisted_across_reopen_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let d1 = ResourceId::from("d1");
        {
            let journal = LocalRatings::in_dir(dir.path(), 100);
            journal.record(ResourceKind::Dish, &rating_fixture("r1", &d1, 4)).unwrap();
        }
        let reopened = LocalRatings::in_dir(dir.path(), 100);
        assert!(reopened.has_rated(ResourceKind::Dish, &d1).unwrap());
        reopened.clear().unwrap();
        assert!(reopened.is_empty());
        assert!(LocalRatings::in_dir(dir.path(), 100).is_empty());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use weekgrid_core::{ActivityId, DAYS_PER_WEEK, IssueId, ProjectId};

use crate::error::StorageError;

/// KV slot for not-yet-committed draft rows, one per display window.
pub fn draft_rows_key(week_start: NaiveDate) -> String {
    format!("draft-rows:{}", week_start.format("%Y-%m-%d"))
}

/// KV slot for orthogonal UI preferences.
pub const PREFS_KEY: &str = "grid-prefs";

/// A new (never-committed) row persisted so drafts survive view reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDraftRow {
    pub row_id: String,
    pub project_id: Option<ProjectId>,
    pub issue_id: Option<IssueId>,
    pub activity_id: Option<ActivityId>,
    #[serde(default)]
    pub comment: String,
    pub hours: [f64; DAYS_PER_WEEK],
}

/// Sort / group / collapse state, kept out of the draft machinery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridPrefs {
    pub sort_by: Option<String>,
    pub group_by_project: bool,
    pub collapsed_projects: Vec<ProjectId>,
}

pub trait KeyValueStore {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set_raw(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    fn delete(&mut self, key: &str) -> Result<(), StorageError>;

    /// Typed read; `default` when the key is absent.
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StorageError> {
        match self.get_raw(key)? {
            Some(bytes) => rmp_serde::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(default),
        }
    }

    /// Typed write, msgpack-encoded.
    fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes =
            rmp_serde::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set_raw(key, &bytes)
    }
}

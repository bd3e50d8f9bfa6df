use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;

use weekgrid_core::EntryId;
use weekgrid_engine::{RemoteEntry, RemoteError, RemoteResourceClient};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory stand-in for the REST client: records every call, hands out
/// sequential ids for creates, and fails on demand per path.
#[derive(Default)]
pub struct MockRemote {
    snapshot: Vec<RemoteEntry>,
    calls: Vec<RecordedCall>,
    fail_paths: HashSet<String>,
    next_id: i64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            ..Default::default()
        }
    }

    pub fn with_snapshot(snapshot: Vec<RemoteEntry>) -> Self {
        Self {
            snapshot,
            next_id: 1000,
            ..Default::default()
        }
    }

    /// Make every call against `path` fail.
    pub fn fail_on(&mut self, path: &str) {
        self.fail_paths.insert(path.to_string());
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    fn check(&self, path: &str) -> Result<(), RemoteError> {
        if self.fail_paths.contains(path) {
            Err(RemoteError(format!("injected failure for {path}")))
        } else {
            Ok(())
        }
    }
}

impl RemoteResourceClient for MockRemote {
    fn create(&mut self, path: &str, body: &Value) -> Result<EntryId, RemoteError> {
        self.calls.push(RecordedCall {
            method: "POST",
            path: path.to_string(),
            body: Some(body.clone()),
        });
        self.check(path)?;
        self.next_id += 1;
        Ok(EntryId::new(self.next_id))
    }

    fn update(&mut self, path: &str, body: &Value) -> Result<(), RemoteError> {
        self.calls.push(RecordedCall {
            method: "PATCH",
            path: path.to_string(),
            body: Some(body.clone()),
        });
        self.check(path)
    }

    fn delete(&mut self, path: &str) -> Result<(), RemoteError> {
        self.calls.push(RecordedCall {
            method: "DELETE",
            path: path.to_string(),
            body: None,
        });
        self.check(path)
    }

    fn list(&mut self, _week_start: NaiveDate) -> Result<Vec<RemoteEntry>, RemoteError> {
        Ok(self.snapshot.clone())
    }
}

//! Boundary with the remote issue-tracking server.
//!
//! The engine emits `{method, path, body}` triples applied verbatim, in
//! queue order, one REST call per operation. A failed call leaves its
//! operation queued untouched; already-applied operations stay applied.

use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use weekgrid_core::{
    ActivityId, Cell, DraftOperation, EntryId, IssueId, OpId, OpKind, ProjectId, Row, RowId,
    TempId, grid::hours_zero,
};

use crate::GridEngine;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote rejected operation: {0}")]
pub struct RemoteError(pub String);

/// One committed entry as fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: EntryId,
    pub project_id: Option<ProjectId>,
    pub parent_project_id: Option<ProjectId>,
    pub issue_id: Option<IssueId>,
    pub activity_id: Option<ActivityId>,
    #[serde(default)]
    pub comment: String,
    pub date: NaiveDate,
    pub hours: f64,
}

/// The external REST client. The core never builds requests beyond the
/// `{method, path, body}` triple each queued operation already carries.
pub trait RemoteResourceClient {
    fn create(&mut self, path: &str, body: &Value) -> Result<EntryId, RemoteError>;
    fn update(&mut self, path: &str, body: &Value) -> Result<(), RemoteError>;
    fn delete(&mut self, path: &str) -> Result<(), RemoteError>;
    fn list(&mut self, week_start: NaiveDate) -> Result<Vec<RemoteEntry>, RemoteError>;
}

/// One snapshot row per remote entry, hours placed in the entry's day
/// column. Entries outside the displayed window are dropped.
pub fn snapshot_rows(entries: Vec<RemoteEntry>, week_start: NaiveDate) -> Vec<Row> {
    let probe = weekgrid_core::GridModel::new(week_start);
    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(day) = probe.day_for(entry.date) else {
            warn!("snapshot entry {} dated {} outside window", entry.id, entry.date);
            continue;
        };
        let mut row = Row {
            id: RowId::from_entry(entry.id),
            project_id: entry.project_id,
            parent_project_id: entry.parent_project_id,
            issue_id: entry.issue_id,
            activity_id: entry.activity_id,
            comment: entry.comment,
            is_new: false,
            days: Default::default(),
        };
        row.days[day.index()] = Cell::synced(entry.id, entry.hours);
        rows.push(row);
    }
    rows
}

/// Per-operation outcome of one commit pass. Every operation is atomic
/// (one REST call each), so there is no partial-operation corruption to
/// report, only whole operations that failed.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub applied: Vec<(OpId, String)>,
    pub failed: Vec<(OpId, String, RemoteError)>,
}

impl CommitReport {
    pub fn all_applied(&self) -> bool {
        self.failed.is_empty()
    }
}

impl GridEngine {
    /// Fetch this window's snapshot from the remote and load it. A failed
    /// fetch leaves grid and queue untouched and returns `false`.
    pub fn fetch_and_load(
        &mut self,
        client: &mut dyn RemoteResourceClient,
    ) -> Result<bool, EngineError> {
        match client.list(self.base.week_start) {
            Ok(entries) => {
                self.load_snapshot(entries)?;
                Ok(true)
            }
            Err(err) => {
                warn!("snapshot fetch failed: {err}");
                Ok(false)
            }
        }
    }

    /// Send every queued operation, in insertion order. Successes are
    /// removed from the queue and folded into the base snapshot; failures
    /// stay queued untouched for retry or discard.
    pub fn commit_queue(
        &mut self,
        client: &mut dyn RemoteResourceClient,
    ) -> Result<CommitReport, EngineError> {
        let ops = self.queue.borrow().get_all();
        let mut report = CommitReport::default();

        for op in ops {
            let body = match &op.payload.body {
                Some(body) => serde_json::to_value(body)
                    .map_err(|e| weekgrid_core::CoreError::Serialization(e.to_string()))?,
                None => Value::Null,
            };

            let outcome = match op.kind {
                OpKind::Create => client
                    .create(&op.payload.path, &body)
                    .map(|new_id| self.absorb_create(&op, new_id)),
                OpKind::Update => client
                    .update(&op.payload.path, &body)
                    .map(|()| self.absorb_update(&op)),
                OpKind::Delete => client
                    .delete(&op.payload.path)
                    .map(|()| self.absorb_delete(&op)),
            };

            match outcome {
                Ok(()) => {
                    self.queue.borrow_mut().remove(op.id, &self.source);
                    report.applied.push((op.id, op.description.clone()));
                }
                Err(err) => {
                    warn!("commit: \"{}\" rejected: {err}", op.description);
                    report.failed.push((op.id, op.description.clone(), err));
                }
            }
        }

        info!(
            "commit: {} applied, {} failed",
            report.applied.len(),
            report.failed.len()
        );
        self.refresh();
        self.persist_draft_rows()?;
        Ok(report)
    }

    /// Fold a successful create into the base snapshot: the targeted cell
    /// becomes a synced cell owned by the new remote id.
    fn absorb_create(&mut self, op: &DraftOperation, new_id: EntryId) {
        let Some(body) = op.payload.body.clone() else {
            return;
        };
        let idx = match &op.temp_id {
            Some(TempId::Cell { row, .. }) => self.base.row_index(row),
            Some(TempId::Aggregate { .. }) => match (body.issue_id, body.activity_id) {
                (Some(issue), Some(activity)) => self.base.find_by_identity(issue, activity),
                _ => None,
            },
            Some(TempId::Paste(_)) | None => {
                self.base
                    .find_by_triple(body.issue_id, body.activity_id, &body.comment)
            }
        };
        let idx = match idx {
            Some(idx) => idx,
            None => {
                let mut row = Row::new_draft(
                    body.project_id,
                    body.issue_id,
                    body.activity_id,
                    body.comment.clone(),
                );
                row.id = RowId::from_entry(new_id);
                self.base.rows.push(row);
                self.base.rows.len() - 1
            }
        };
        if let Some(day) = self.base.day_for(body.date) {
            let row = &mut self.base.rows[idx];
            *row.cell_mut(day) = Cell::synced(new_id, body.hours);
            // The row now owns a committed entry.
            row.is_new = false;
        }
    }

    fn absorb_update(&mut self, op: &DraftOperation) {
        let (Some(entry), Some(body)) = (op.resource_id, op.payload.body.as_ref()) else {
            return;
        };
        if let Some((idx, day)) = self.base.locate_entry(entry) {
            *self.base.rows[idx].cell_mut(day) = Cell::synced(entry, body.hours);
        }
    }

    fn absorb_delete(&mut self, op: &DraftOperation) {
        let Some(entry) = op.resource_id else {
            return;
        };
        if let Some((idx, day)) = self.base.locate_entry(entry) {
            *self.base.rows[idx].cell_mut(day) = Cell::default();
            // A row with no hours left, no remote backing and no queued
            // work has reached the end of its lifecycle.
            let row = &self.base.rows[idx];
            if !row.has_synced_cells() && hours_zero(row.week_total()) {
                let prefix = format!("{}:", row.id);
                if self.queue.borrow().get_all().iter().all(|pending| {
                    pending
                        .temp_id
                        .as_ref()
                        .is_none_or(|t| !t.to_string().starts_with(&prefix))
                }) {
                    self.base.rows.remove(idx);
                }
            }
        }
    }
}

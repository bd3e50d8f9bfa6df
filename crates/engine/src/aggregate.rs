//! Edit resolution for merged cells and merged fields.
//!
//! Several underlying entries sharing an (issue, activity, comment) key are
//! displayed as one row. Editing the merged view has to fan out into
//! concrete queue operations, and collapsing more than one entry into one
//! value is destructive, so it never happens without confirmation.

use log::debug;
use serde::{Deserialize, Serialize};

use weekgrid_core::{
    ActivityId, AggregationKey, DayIndex, DraftOperation, EntryBody, EntryId, IssueId, ProjectId,
    ResourceKey, RowId, TempId,
    grid::{hours_eq, hours_zero},
};

use crate::error::EngineError;
use crate::{GridEngine, RowIdentity};

/// A row identity field targeted by an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum RowField {
    Project(ProjectId),
    Issue(IssueId),
    Activity(ActivityId),
    Comment(String),
}

/// Pending question surfaced instead of mutating more than one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedCellConfirm {
    pub key: AggregationKey,
    pub day: DayIndex,
    pub proposed_hours: f64,
    pub source_entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedFieldConfirm {
    pub key: AggregationKey,
    pub field: RowField,
    pub source_row_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellEditOutcome {
    Applied,
    ConfirmationRequired(AggregatedCellConfirm),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldEditOutcome {
    Applied,
    ConfirmationRequired(AggregatedFieldConfirm),
}

impl GridEngine {
    /// Resolve an hour edit made against a merged cell.
    ///
    /// Cardinality 0 and 1 behave like a plain cell edit. With more than one
    /// source entry the edit is destructive (N entries collapse into at most
    /// one), so nothing mutates until `confirmed` is set.
    pub fn update_aggregated_cell(
        &mut self,
        key: &AggregationKey,
        day: DayIndex,
        hours: f64,
        confirmed: bool,
    ) -> Result<CellEditOutcome, EngineError> {
        let date = self.grid.date_for(day);
        let sources = self.grid.source_entries(key, day);
        let new_key = ResourceKey::New {
            issue: key.issue_id,
            activity: key.activity_id,
            date,
        };

        match sources.len() {
            0 => {
                if hours_zero(hours) {
                    self.queue.borrow_mut().remove_by_key(&new_key, &self.source);
                } else {
                    let op = self.aggregate_create(key, day, hours);
                    self.queue.borrow_mut().add(op, &self.source);
                }
            }

            1 => {
                let source = &sources[0];
                match source.entry_id {
                    // Draft contribution: replace or drop the pending create.
                    None => {
                        if hours_zero(hours) {
                            self.queue.borrow_mut().remove_by_key(&new_key, &self.source);
                        } else {
                            let op = self.aggregate_create(key, day, hours);
                            self.queue.borrow_mut().add(op, &self.source);
                        }
                    }
                    // Saved contribution: same resolution as a plain cell.
                    Some(entry_id) => {
                        if hours_eq(hours, source.original_hours) {
                            self.queue
                                .borrow_mut()
                                .remove_by_key(&ResourceKey::Saved(entry_id), &self.source);
                        } else if hours_zero(hours) {
                            let op = DraftOperation::delete(self.clock.tick(), entry_id, date);
                            self.queue.borrow_mut().add(op, &self.source);
                        } else {
                            let body = self.aggregate_body(key, date, hours);
                            let op = DraftOperation::update(self.clock.tick(), entry_id, body);
                            self.queue.borrow_mut().add(op, &self.source);
                        }
                    }
                }
            }

            count => {
                if !confirmed {
                    debug!(
                        "aggregated edit on {count} entries needs confirmation (issue {}, day {day})",
                        key.issue_id
                    );
                    return Ok(CellEditOutcome::ConfirmationRequired(AggregatedCellConfirm {
                        key: key.clone(),
                        day,
                        proposed_hours: hours,
                        source_entry_count: count,
                    }));
                }

                // Clear every contribution: one delete per saved entry, and
                // the shared pending create for the draft ones.
                for source in &sources {
                    match source.entry_id {
                        Some(entry_id) => {
                            let op = DraftOperation::delete(self.clock.tick(), entry_id, date);
                            self.queue.borrow_mut().add(op, &self.source);
                        }
                        None => {
                            self.queue.borrow_mut().remove_by_key(&new_key, &self.source);
                        }
                    }
                }
                // Then exactly one create carries the merged value.
                if !hours_zero(hours) {
                    let op = self.aggregate_create(key, day, hours);
                    self.queue.borrow_mut().add(op, &self.source);
                }
            }
        }

        self.refresh();
        self.persist_draft_rows()?;
        Ok(CellEditOutcome::Applied)
    }

    /// Resolve a field edit made against a merged row. On confirm the change
    /// is applied to every source row independently through the normal
    /// single-row field-update path.
    pub fn update_aggregated_field(
        &mut self,
        key: &AggregationKey,
        field: RowField,
        confirmed: bool,
    ) -> Result<FieldEditOutcome, EngineError> {
        let indices = self.grid.find_by_aggregation(key);
        if indices.len() > 1 && !confirmed {
            return Ok(FieldEditOutcome::ConfirmationRequired(
                AggregatedFieldConfirm {
                    key: key.clone(),
                    field,
                    source_row_count: indices.len(),
                },
            ));
        }

        let row_ids: Vec<RowId> = indices
            .into_iter()
            .map(|idx| self.grid.rows[idx].id.clone())
            .collect();
        for row_id in row_ids {
            self.update_row_field(&row_id, field.clone())?;
        }
        Ok(FieldEditOutcome::Applied)
    }

    /// Collapse 2+ saved entries of a merged cell into the one with the
    /// lowest remote id: one update carrying the summed hours, one delete
    /// for every other entry.
    pub fn merge_entries(
        &mut self,
        key: &AggregationKey,
        day: DayIndex,
    ) -> Result<bool, EngineError> {
        let date = self.grid.date_for(day);
        let mut saved: Vec<(EntryId, f64)> = self
            .grid
            .source_entries(key, day)
            .into_iter()
            .filter_map(|s| s.entry_id.map(|id| (id, s.hours)))
            .collect();
        if saved.len() < 2 {
            return Ok(false);
        }
        saved.sort_by_key(|(id, _)| *id);

        let total: f64 = saved.iter().map(|(_, h)| h).sum();
        let (survivor, _) = saved[0];

        let body = self.aggregate_body(key, date, total);
        let op = DraftOperation::update(self.clock.tick(), survivor, body);
        self.queue.borrow_mut().add(op, &self.source);

        for &(entry_id, _) in &saved[1..] {
            let op = DraftOperation::delete(self.clock.tick(), entry_id, date);
            self.queue.borrow_mut().add(op, &self.source);
        }

        self.refresh();
        Ok(true)
    }

    /// Undo a confirmed aggregated deletion: drop the merged create and the
    /// queued deletes, letting every source cell fall back to its server
    /// value.
    pub fn restore_aggregated_entries(
        &mut self,
        key: &AggregationKey,
        day: DayIndex,
    ) -> Result<(), EngineError> {
        let date = self.grid.date_for(day);
        self.queue.borrow_mut().remove_by_key(
            &ResourceKey::New {
                issue: key.issue_id,
                activity: key.activity_id,
                date,
            },
            &self.source,
        );
        for source in self.grid.source_entries(key, day) {
            if let Some(entry_id) = source.entry_id {
                self.queue
                    .borrow_mut()
                    .remove_by_key(&ResourceKey::Saved(entry_id), &self.source);
            }
        }
        self.refresh();
        self.persist_draft_rows()
    }

    /// Duplicate a merged row: sum hours across all contributing source
    /// rows, then treat the result as a normal new row.
    pub fn duplicate_aggregated(
        &mut self,
        key: &AggregationKey,
    ) -> Result<Option<RowId>, EngineError> {
        let indices = self.grid.find_by_aggregation(key);
        let Some(&first) = indices.first() else {
            return Ok(None);
        };
        let identity = {
            let row = &self.grid.rows[first];
            RowIdentity {
                project_id: row.project_id,
                parent_project_id: row.parent_project_id,
                issue_id: Some(key.issue_id),
                activity_id: Some(key.activity_id),
                comment: key.comment.clone(),
            }
        };
        let hours: Vec<(DayIndex, f64)> = DayIndex::all()
            .map(|day| {
                let total = indices
                    .iter()
                    .map(|&idx| self.grid.rows[idx].cell(day).hours)
                    .sum();
                (day, total)
            })
            .collect();
        Ok(Some(self.spawn_draft_row(identity, &hours)?))
    }

    /// A shape-1 create (aggregated-cell temp id) for the merged value.
    fn aggregate_create(&mut self, key: &AggregationKey, day: DayIndex, hours: f64) -> DraftOperation {
        let date = self.grid.date_for(day);
        let body = self.aggregate_body(key, date, hours);
        DraftOperation::create(
            self.clock.tick(),
            key.issue_id,
            key.activity_id,
            TempId::Aggregate {
                issue: key.issue_id,
                activity: key.activity_id,
                comment: key.comment.clone(),
                day,
            },
            body,
        )
    }

    fn aggregate_body(
        &self,
        key: &AggregationKey,
        date: chrono::NaiveDate,
        hours: f64,
    ) -> EntryBody {
        // Project comes from whichever row carries this key.
        let project_id = self
            .grid
            .find_by_aggregation(key)
            .first()
            .and_then(|&idx| self.grid.rows[idx].project_id);
        EntryBody {
            project_id,
            issue_id: Some(key.issue_id),
            activity_id: Some(key.activity_id),
            date,
            hours,
            comment: key.comment.clone(),
        }
    }
}

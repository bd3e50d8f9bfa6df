pub mod aggregate;
pub mod commit;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod undo;

pub use aggregate::{
    AggregatedCellConfirm, AggregatedFieldConfirm, CellEditOutcome, FieldEditOutcome, RowField,
};
pub use commit::{CommitReport, RemoteEntry, RemoteError, RemoteResourceClient, snapshot_rows};
pub use error::EngineError;
pub use protocol::{Inbound, Outbound};
pub use reconcile::reconcile;
pub use undo::CellEdit;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::NaiveDate;
use log::debug;

use weekgrid_core::{
    ActivityId, DayIndex, DraftClock, DraftOperation, DraftQueue, EntryBody, EntryId, GridModel,
    IssueId, OpId, ProjectId, ResourceKey, Row, RowId, SourceTag, TempId,
    grid::{hours_eq, hours_zero, week_containing},
};
use weekgrid_storage::{
    GridPrefs, KeyValueStore, PREFS_KEY, PersistedDraftRow, SqliteKvStore, draft_rows_key,
};

use crate::undo::{DEFAULT_UNDO_DEPTH, UndoManager};

/// Everything one displayed week needs while offline: the visible grid, the
/// pending operation queue and persistence of not-yet-committed rows.
/// Several independent views may share one queue; every write carries this
/// engine's source tag so the other views can react without echo storms.
pub struct GridEngine {
    /// Pristine snapshot plus skeletons of ephemeral rows. Never carries
    /// pending edits; the visible grid is always `reconcile(base, queue)`.
    pub(crate) base: GridModel,
    pub(crate) grid: GridModel,
    pub(crate) queue: Rc<RefCell<DraftQueue>>,
    pub(crate) kv: SqliteKvStore,
    pub(crate) clock: DraftClock,
    pub(crate) source: SourceTag,
    pub(crate) undo: UndoManager,
    /// Rows with remote entries removed from view, retained for restore.
    pub(crate) removed_rows: HashMap<RowId, Row>,
    pub(crate) copied_week: Vec<CopiedEntry>,
}

/// One (day, entry) pair captured by a week copy.
#[derive(Debug, Clone)]
pub(crate) struct CopiedEntry {
    project_id: Option<ProjectId>,
    issue_id: IssueId,
    activity_id: ActivityId,
    comment: String,
    day: DayIndex,
    hours: f64,
}

impl GridEngine {
    pub fn new(week_start: NaiveDate, kv: SqliteKvStore, source: SourceTag) -> Self {
        Self::with_queue(
            week_start,
            kv,
            source,
            Rc::new(RefCell::new(DraftQueue::new())),
        )
    }

    /// Attach to an existing queue shared with other views.
    pub fn with_queue(
        week_start: NaiveDate,
        kv: SqliteKvStore,
        source: SourceTag,
        queue: Rc<RefCell<DraftQueue>>,
    ) -> Self {
        let week_start = week_containing(week_start);
        Self {
            base: GridModel::new(week_start),
            grid: GridModel::new(week_start),
            queue,
            kv,
            clock: DraftClock::new(),
            source,
            undo: UndoManager::new(DEFAULT_UNDO_DEPTH),
            removed_rows: HashMap::new(),
            copied_week: Vec::new(),
        }
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn week_start(&self) -> NaiveDate {
        self.base.week_start
    }

    pub fn queue_handle(&self) -> Rc<RefCell<DraftQueue>> {
        Rc::clone(&self.queue)
    }

    pub fn source_tag(&self) -> &SourceTag {
        &self.source
    }

    /// Rebuild the visible grid from the pristine base and the queue. Views
    /// sharing a queue call this when notified of another view's write.
    pub fn refresh(&mut self) {
        let ops = self.queue.borrow().get_all();
        self.grid = reconcile::reconcile(self.base.rows.clone(), &ops, self.base.week_start);
    }

    // ========================================================================
    // Snapshot load & draft-row persistence
    // ========================================================================

    /// Replace the base with a freshly fetched snapshot, restore persisted
    /// draft rows for this window and replay the queue on top.
    pub fn load_snapshot(&mut self, entries: Vec<RemoteEntry>) -> Result<(), EngineError> {
        let week_start = self.base.week_start;
        self.base = GridModel::with_rows(week_start, commit::snapshot_rows(entries, week_start));
        self.removed_rows.clear();
        self.restore_draft_rows()?;
        self.refresh();
        self.persist_draft_rows()
    }

    /// Re-materialize persisted draft rows: the skeleton joins the base, and
    /// any persisted hours turn back into queued creates unless an
    /// operation for that cell is already pending.
    fn restore_draft_rows(&mut self) -> Result<(), EngineError> {
        let key = draft_rows_key(self.base.week_start);
        let persisted: Vec<PersistedDraftRow> = self.kv.get(&key, Vec::new())?;
        for p in persisted {
            let row_id = RowId::new(p.row_id.clone());
            if self.base.row(&row_id).is_some() {
                continue;
            }
            let mut row = Row::new_draft(p.project_id, p.issue_id, p.activity_id, p.comment.clone());
            row.id = row_id.clone();
            for day in DayIndex::all() {
                let hours = p.hours[day.index()];
                if hours_zero(hours) {
                    continue;
                }
                let date = self.base.date_for(day);
                match (p.issue_id, p.activity_id) {
                    (Some(issue), Some(activity)) => {
                        let rk = ResourceKey::New {
                            issue,
                            activity,
                            date,
                        };
                        if self.queue.borrow().get(&rk).is_none() {
                            let body = EntryBody {
                                project_id: p.project_id,
                                issue_id: Some(issue),
                                activity_id: Some(activity),
                                date,
                                hours,
                                comment: p.comment.clone(),
                            };
                            let op = DraftOperation::create(
                                self.clock.tick(),
                                issue,
                                activity,
                                TempId::Cell {
                                    row: row_id.clone(),
                                    day,
                                },
                                body,
                            );
                            self.queue.borrow_mut().add(op, &self.source);
                        }
                    }
                    // Incomplete identity: the value can only live client-side.
                    _ => row.cell_mut(day).hours = hours,
                }
            }
            self.base.rows.push(row);
        }
        Ok(())
    }

    pub(crate) fn persist_draft_rows(&mut self) -> Result<(), EngineError> {
        let rows: Vec<PersistedDraftRow> = self
            .grid
            .rows
            .iter()
            .filter(|r| r.is_new)
            .map(|r| PersistedDraftRow {
                row_id: r.id.to_string(),
                project_id: r.project_id,
                issue_id: r.issue_id,
                activity_id: r.activity_id,
                comment: r.comment.clone(),
                hours: std::array::from_fn(|i| r.days[i].hours),
            })
            .collect();
        self.kv.set(&draft_rows_key(self.base.week_start), &rows)?;
        Ok(())
    }

    pub fn prefs(&self) -> Result<GridPrefs, EngineError> {
        Ok(self.kv.get(PREFS_KEY, GridPrefs::default())?)
    }

    pub fn set_prefs(&mut self, prefs: &GridPrefs) -> Result<(), EngineError> {
        Ok(self.kv.set(PREFS_KEY, prefs)?)
    }

    // ========================================================================
    // Cell edits
    // ========================================================================

    /// Record an undoable hour change and push it through the edit path.
    pub fn update_cell(
        &mut self,
        row_id: &RowId,
        day: DayIndex,
        hours: f64,
    ) -> Result<(), EngineError> {
        let Some(before) = self.grid.row(row_id).map(|r| r.cell(day).hours) else {
            debug!("edit: row {row_id} not found, ignoring");
            return Ok(());
        };
        if hours_eq(before, hours) {
            return Ok(());
        }
        self.undo.record(CellEdit {
            row_id: row_id.clone(),
            day,
            before,
            after: hours,
        });
        self.apply_cell_edit(row_id, day, hours)
    }

    /// The one edit path every hour change funnels through: direct edits,
    /// undo, redo. Decides between create/update/delete/remove-pending from
    /// the cell's sync state.
    pub(crate) fn apply_cell_edit(
        &mut self,
        row_id: &RowId,
        day: DayIndex,
        hours: f64,
    ) -> Result<(), EngineError> {
        let Some(row) = self.grid.row(row_id) else {
            debug!("edit: row {row_id} gone, ignoring");
            return Ok(());
        };
        let cell = row.cell(day);
        let entry = cell.entry_id;
        let original = cell.original_hours;
        let project = row.project_id;
        let issue = row.issue_id;
        let activity = row.activity_id;
        let comment = row.comment.clone();
        let date = self.grid.date_for(day);

        match entry {
            Some(entry_id) => {
                if hours_eq(hours, original) {
                    // Reverted to the server value: whatever was pending is moot.
                    self.queue
                        .borrow_mut()
                        .remove_by_key(&ResourceKey::Saved(entry_id), &self.source);
                } else if hours_zero(hours) {
                    let op = DraftOperation::delete(self.clock.tick(), entry_id, date);
                    self.queue.borrow_mut().add(op, &self.source);
                } else {
                    let body = EntryBody {
                        project_id: project,
                        issue_id: issue,
                        activity_id: activity,
                        date,
                        hours,
                        comment,
                    };
                    let op = DraftOperation::update(self.clock.tick(), entry_id, body);
                    self.queue.borrow_mut().add(op, &self.source);
                }
            }
            None => match (issue, activity) {
                (Some(issue), Some(activity)) => {
                    let key = ResourceKey::New {
                        issue,
                        activity,
                        date,
                    };
                    if hours_zero(hours) {
                        self.queue.borrow_mut().remove_by_key(&key, &self.source);
                    } else {
                        let body = EntryBody {
                            project_id: project,
                            issue_id: Some(issue),
                            activity_id: Some(activity),
                            date,
                            hours,
                            comment,
                        };
                        let op = DraftOperation::create(
                            self.clock.tick(),
                            issue,
                            activity,
                            TempId::Cell {
                                row: row_id.clone(),
                                day,
                            },
                            body,
                        );
                        self.queue.borrow_mut().add(op, &self.source);
                    }
                }
                // Incomplete identity: keep the value client-side only.
                _ => {
                    if let Some(base_row) = self.base.row_mut(row_id) {
                        base_row.cell_mut(day).hours = hours;
                    }
                }
            },
        }

        self.refresh();
        self.persist_draft_rows()
    }

    pub fn undo(&mut self) -> Result<bool, EngineError> {
        let Some(edit) = self.undo.pop_undo() else {
            return Ok(false);
        };
        self.apply_cell_edit(&edit.row_id, edit.day, edit.before)?;
        self.undo.push_redo(edit);
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool, EngineError> {
        let Some(edit) = self.undo.pop_redo() else {
            return Ok(false);
        };
        self.apply_cell_edit(&edit.row_id, edit.day, edit.after)?;
        self.undo.push_undo(edit);
        Ok(true)
    }

    // ========================================================================
    // Row operations
    // ========================================================================

    /// Change one identity field of a row. Saved cells get the change pushed
    /// through the normal update path; pending creates are re-keyed under
    /// the new identity.
    pub fn update_row_field(
        &mut self,
        row_id: &RowId,
        field: RowField,
    ) -> Result<(), EngineError> {
        let Some(base_idx) = self.base.row_index(row_id) else {
            debug!("field edit: row {row_id} not found, ignoring");
            return Ok(());
        };

        let (old_issue, old_activity) = {
            let row = &self.base.rows[base_idx];
            (row.issue_id, row.activity_id)
        };

        let changed = {
            let row = &mut self.base.rows[base_idx];
            match &field {
                RowField::Project(p) => {
                    let changed = row.project_id != Some(*p);
                    row.project_id = Some(*p);
                    changed
                }
                RowField::Issue(i) => {
                    let changed = row.issue_id != Some(*i);
                    row.issue_id = Some(*i);
                    changed
                }
                RowField::Activity(a) => {
                    let changed = row.activity_id != Some(*a);
                    row.activity_id = Some(*a);
                    changed
                }
                RowField::Comment(text) => {
                    let changed = row.comment != *text;
                    row.comment = text.clone();
                    changed
                }
            }
        };
        if !changed {
            return Ok(());
        }

        // Current view state before the rebuild: which cells are synced and
        // what hours they show.
        let cells: Vec<(DayIndex, Option<EntryId>, f64)> = self
            .grid
            .row(row_id)
            .map(|row| {
                DayIndex::all()
                    .map(|d| (d, row.cell(d).entry_id, row.cell(d).hours))
                    .collect()
            })
            .unwrap_or_default();

        let (project, issue, activity, comment) = {
            let row = &self.base.rows[base_idx];
            (
                row.project_id,
                row.issue_id,
                row.activity_id,
                row.comment.clone(),
            )
        };

        for (day, entry, hours) in cells {
            let date = self.base.date_for(day);
            match entry {
                Some(entry_id) => {
                    let body = EntryBody {
                        project_id: project,
                        issue_id: issue,
                        activity_id: activity,
                        date,
                        hours,
                        comment: comment.clone(),
                    };
                    let op = DraftOperation::update(self.clock.tick(), entry_id, body);
                    self.queue.borrow_mut().add(op, &self.source);
                }
                None if !hours_zero(hours) => {
                    if let (Some(old_issue), Some(old_activity)) = (old_issue, old_activity) {
                        self.queue.borrow_mut().remove_by_key(
                            &ResourceKey::New {
                                issue: old_issue,
                                activity: old_activity,
                                date,
                            },
                            &self.source,
                        );
                    }
                    if let (Some(issue), Some(activity)) = (issue, activity) {
                        let body = EntryBody {
                            project_id: project,
                            issue_id: Some(issue),
                            activity_id: Some(activity),
                            date,
                            hours,
                            comment: comment.clone(),
                        };
                        let op = DraftOperation::create(
                            self.clock.tick(),
                            issue,
                            activity,
                            TempId::Cell {
                                row: row_id.clone(),
                                day,
                            },
                            body,
                        );
                        self.queue.borrow_mut().add(op, &self.source);
                    }
                }
                None => {}
            }
        }

        self.refresh();
        self.persist_draft_rows()
    }

    /// Append an ephemeral row with no remote backing.
    pub fn add_row(
        &mut self,
        project_id: Option<ProjectId>,
        issue_id: Option<IssueId>,
        activity_id: Option<ActivityId>,
        comment: impl Into<String>,
    ) -> Result<RowId, EngineError> {
        let row = Row::new_draft(project_id, issue_id, activity_id, comment);
        let id = row.id.clone();
        self.base.rows.push(row);
        self.refresh();
        self.persist_draft_rows()?;
        Ok(id)
    }

    /// Delete a row. A purely local row just disappears along with its
    /// queued creates; a row with remote entries queues one delete per
    /// synced cell and is retained off-screen for an explicit restore.
    pub fn delete_row(&mut self, row_id: &RowId) -> Result<bool, EngineError> {
        let Some(idx) = self.base.row_index(row_id) else {
            return Ok(false);
        };
        let row = self.base.rows.remove(idx);

        if row.has_synced_cells() {
            for day in DayIndex::all() {
                if let Some(entry) = row.cell(day).entry_id {
                    let date = self.base.date_for(day);
                    let op = DraftOperation::delete(self.clock.tick(), entry, date);
                    self.queue.borrow_mut().add(op, &self.source);
                }
            }
            self.removed_rows.insert(row.id.clone(), row);
        }
        // Creates originating from this row's cells are moot either way.
        self.queue
            .borrow_mut()
            .remove_by_temp_prefix(&format!("{row_id}:"), &self.source);

        self.refresh();
        self.persist_draft_rows()?;
        Ok(true)
    }

    /// Bring back a row removed by `delete_row`, dropping its queued deletes.
    pub fn restore_deleted_row(&mut self, row_id: &RowId) -> Result<bool, EngineError> {
        let Some(row) = self.removed_rows.remove(row_id) else {
            return Ok(false);
        };
        for day in DayIndex::all() {
            if let Some(entry) = row.cell(day).entry_id {
                self.queue
                    .borrow_mut()
                    .remove_by_key(&ResourceKey::Saved(entry), &self.source);
            }
        }
        self.base.rows.push(row);
        self.refresh();
        Ok(true)
    }

    /// Copy identity and hours into a fresh draft row. Every cell starts
    /// unsynced: no entry ids, original hours zero.
    pub fn duplicate_row(&mut self, row_id: &RowId) -> Result<Option<RowId>, EngineError> {
        let Some(row) = self.grid.row(row_id) else {
            return Ok(None);
        };
        let identity = RowIdentity {
            project_id: row.project_id,
            parent_project_id: row.parent_project_id,
            issue_id: row.issue_id,
            activity_id: row.activity_id,
            comment: row.comment.clone(),
        };
        let hours: Vec<(DayIndex, f64)> = DayIndex::all()
            .map(|d| (d, row.cell(d).hours))
            .collect();
        Ok(Some(self.spawn_draft_row(identity, &hours)?))
    }

    pub(crate) fn spawn_draft_row(
        &mut self,
        identity: RowIdentity,
        hours: &[(DayIndex, f64)],
    ) -> Result<RowId, EngineError> {
        let mut row = Row::new_draft(
            identity.project_id,
            identity.issue_id,
            identity.activity_id,
            identity.comment.clone(),
        );
        row.parent_project_id = identity.parent_project_id;
        let id = row.id.clone();
        self.base.rows.push(row);

        for &(day, h) in hours {
            if hours_zero(h) {
                continue;
            }
            let date = self.base.date_for(day);
            match (identity.issue_id, identity.activity_id) {
                (Some(issue), Some(activity)) => {
                    let body = EntryBody {
                        project_id: identity.project_id,
                        issue_id: Some(issue),
                        activity_id: Some(activity),
                        date,
                        hours: h,
                        comment: identity.comment.clone(),
                    };
                    let op = DraftOperation::create(
                        self.clock.tick(),
                        issue,
                        activity,
                        TempId::Cell {
                            row: id.clone(),
                            day,
                        },
                        body,
                    );
                    self.queue.borrow_mut().add(op, &self.source);
                }
                _ => {
                    if let Some(base_row) = self.base.row_mut(&id) {
                        base_row.cell_mut(day).hours = h;
                    }
                }
            }
        }

        self.refresh();
        self.persist_draft_rows()?;
        Ok(id)
    }

    // ========================================================================
    // Week copy / paste
    // ========================================================================

    /// Capture every non-empty (day, entry) pair of the current week.
    pub fn copy_week(&mut self) -> usize {
        let mut copied = Vec::new();
        for row in &self.grid.rows {
            let (Some(issue_id), Some(activity_id)) = (row.issue_id, row.activity_id) else {
                continue;
            };
            for day in DayIndex::all() {
                let hours = row.cell(day).hours;
                if !hours_zero(hours) {
                    copied.push(CopiedEntry {
                        project_id: row.project_id,
                        issue_id,
                        activity_id,
                        comment: row.comment.clone(),
                        day,
                        hours,
                    });
                }
            }
        }
        let count = copied.len();
        self.copied_week = copied;
        count
    }

    /// Enqueue one create per copied (day, entry) pair. The returned op ids
    /// let an undo remove exactly this paste and nothing else.
    pub fn paste_week(&mut self) -> Result<Vec<OpId>, EngineError> {
        let copied = self.copied_week.clone();
        let mut ids = Vec::with_capacity(copied.len());
        for entry in copied {
            let date = self.base.date_for(entry.day);
            let body = EntryBody {
                project_id: entry.project_id,
                issue_id: Some(entry.issue_id),
                activity_id: Some(entry.activity_id),
                date,
                hours: entry.hours,
                comment: entry.comment,
            };
            let op = DraftOperation::create(
                self.clock.tick(),
                entry.issue_id,
                entry.activity_id,
                TempId::paste(),
                body,
            );
            ids.push(op.id);
            self.queue.borrow_mut().add(op, &self.source);
        }
        self.refresh();
        self.persist_draft_rows()?;
        Ok(ids)
    }

    pub fn undo_paste(&mut self, op_ids: &[OpId]) -> Result<usize, EngineError> {
        let removed = self.queue.borrow_mut().remove_many(op_ids, &self.source);
        if removed > 0 {
            self.refresh();
            self.persist_draft_rows()?;
        }
        Ok(removed)
    }
}

/// Identity attributes carried over when spawning a draft row.
#[derive(Debug, Clone)]
pub(crate) struct RowIdentity {
    pub project_id: Option<ProjectId>,
    pub parent_project_id: Option<ProjectId>,
    pub issue_id: Option<IssueId>,
    pub activity_id: Option<ActivityId>,
    pub comment: String,
}

//! Pure merge of a server snapshot with the pending queue.
//!
//! Nothing here touches the network: every queued operation's intended
//! end-state is made visible on the snapshot rows. Operations referencing
//! rows or entries that no longer exist are skipped silently; a queue whose
//! keys collide is impossible by construction, so replay order only has to
//! stay deterministic, not clever.

use chrono::NaiveDate;
use log::{debug, warn};

use weekgrid_core::{DraftOperation, GridModel, OpKind, Row, RowId, TempId};

/// Replay `ops` (in queue insertion order) onto freshly fetched snapshot
/// rows. Pure function of its inputs: identical inputs yield structurally
/// equal output.
pub fn reconcile(rows: Vec<Row>, ops: &[DraftOperation], week_start: NaiveDate) -> GridModel {
    let mut grid = GridModel::with_rows(week_start, rows);
    for op in ops {
        match op.kind {
            OpKind::Update | OpKind::Delete => apply_saved(&mut grid, op),
            OpKind::Create => apply_create(&mut grid, op),
        }
    }
    grid
}

fn apply_saved(grid: &mut GridModel, op: &DraftOperation) {
    let Some(entry) = op.resource_id else {
        warn!("replay: {} op {} has no resource id", op.kind.as_str(), op.id);
        return;
    };
    let Some((idx, day)) = grid.locate_entry(entry) else {
        debug!("replay: entry {entry} not in snapshot, skipping \"{}\"", op.description);
        return;
    };
    let cell = grid.rows[idx].cell_mut(day);
    match op.kind {
        OpKind::Update => {
            let Some(hours) = op.hours() else {
                warn!("replay: update {} carries no hours", op.id);
                return;
            };
            cell.hours = hours;
            cell.dirty = true;
        }
        OpKind::Delete => {
            // Row and cell are retained so the delete can still be undone
            // before commit; only the hours go to zero.
            cell.hours = 0.0;
            cell.dirty = true;
        }
        OpKind::Create => unreachable!("creates are dispatched by temp id"),
    }
}

fn apply_create(grid: &mut GridModel, op: &DraftOperation) {
    let Some(body) = op.payload.body.clone() else {
        warn!("replay: create {} carries no body", op.id);
        return;
    };

    match &op.temp_id {
        // Shape 1: edit of a merged cell. The row is located by the
        // (issue, activity) pair carried in the payload.
        Some(TempId::Aggregate { day, .. }) => {
            let (Some(issue), Some(activity)) = (body.issue_id, body.activity_id) else {
                warn!("replay: aggregate create {} lacks identity", op.id);
                return;
            };
            let Some(idx) = grid.find_by_identity(issue, activity) else {
                debug!("replay: no row for issue {issue}/activity {activity}, skipping");
                return;
            };
            let cell = grid.rows[idx].cell_mut(*day);
            cell.hours = body.hours;
            cell.dirty = true;
        }

        // Shape 2: bulk paste. Identity lives entirely in the payload; the
        // target row is synthesized when the snapshot has no match, and
        // dates outside the displayed window are skipped.
        Some(TempId::Paste(_)) => {
            let Some(day) = grid.day_for(body.date) else {
                debug!("replay: paste {} targets {} outside window", op.id, body.date);
                return;
            };
            let idx = match grid.find_by_triple(body.issue_id, body.activity_id, &body.comment) {
                Some(idx) => idx,
                None => {
                    let mut row = Row::new_draft(
                        body.project_id,
                        body.issue_id,
                        body.activity_id,
                        body.comment.clone(),
                    );
                    // Deterministic id: replaying identical inputs must
                    // yield structurally equal grids.
                    row.id = RowId::new(format!("draft-{}", op.id));
                    grid.rows.push(row);
                    grid.rows.len() - 1
                }
            };
            let cell = grid.rows[idx].cell_mut(day);
            cell.hours = body.hours;
            cell.dirty = true;
        }

        // Shape 3: ordinary single-row cell edit. A missing row means it
        // was deleted after the op was queued; skip silently.
        Some(TempId::Cell { row, day }) => {
            let Some(target) = grid.row_mut(row) else {
                debug!("replay: row {row} gone, skipping \"{}\"", op.description);
                return;
            };
            let cell = target.cell_mut(*day);
            cell.hours = body.hours;
            cell.dirty = true;
        }

        None => warn!("replay: create {} has no temp id", op.id),
    }
}

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::ids::{ActivityId, DAYS_PER_WEEK, DayIndex, EntryId, IssueId, ProjectId, RowId};

/// Tolerance for comparing user-entered hour values.
pub const HOURS_EPSILON: f64 = 1e-9;

pub fn hours_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < HOURS_EPSILON
}

pub fn hours_zero(h: f64) -> bool {
    hours_eq(h, 0.0)
}

/// Monday of the week containing `date`.
pub fn week_containing(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// One day slot of a row. `original_hours` is the last known server value,
/// 0 if the cell was never synced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub hours: f64,
    pub original_hours: f64,
    pub entry_id: Option<EntryId>,
    pub dirty: bool,
}

impl Cell {
    pub fn synced(entry_id: EntryId, hours: f64) -> Self {
        Self {
            hours,
            original_hours: hours,
            entry_id: Some(entry_id),
            dirty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        hours_zero(self.hours) && self.entry_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: RowId,
    pub project_id: Option<ProjectId>,
    pub parent_project_id: Option<ProjectId>,
    pub issue_id: Option<IssueId>,
    pub activity_id: Option<ActivityId>,
    #[serde(default)]
    pub comment: String,
    pub is_new: bool,
    pub days: [Cell; DAYS_PER_WEEK],
}

impl Row {
    /// An ephemeral row with no remote backing yet.
    pub fn new_draft(
        project_id: Option<ProjectId>,
        issue_id: Option<IssueId>,
        activity_id: Option<ActivityId>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: RowId::fresh(),
            project_id,
            parent_project_id: None,
            issue_id,
            activity_id,
            comment: comment.into(),
            is_new: true,
            days: Default::default(),
        }
    }

    pub fn cell(&self, day: DayIndex) -> &Cell {
        &self.days[day.index()]
    }

    pub fn cell_mut(&mut self, day: DayIndex) -> &mut Cell {
        &mut self.days[day.index()]
    }

    /// Derived, never stored.
    pub fn week_total(&self) -> f64 {
        self.days.iter().map(|c| c.hours).sum()
    }

    pub fn has_synced_cells(&self) -> bool {
        self.days.iter().any(|c| c.entry_id.is_some())
    }

    pub fn is_blank(&self) -> bool {
        self.days.iter().all(Cell::is_empty)
    }

    /// Display-time join key; present only when both identity halves are.
    pub fn aggregation_key(&self) -> Option<AggregationKey> {
        Some(AggregationKey {
            issue_id: self.issue_id?,
            activity_id: self.activity_id?,
            comment: self.comment.clone(),
        })
    }
}

/// (issue, activity, comment) tuple merging multiple entries into one
/// displayed row. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationKey {
    pub issue_id: IssueId,
    pub activity_id: ActivityId,
    #[serde(default)]
    pub comment: String,
}

/// One underlying entry contributing to a merged cell. A `None` entry id
/// means the contribution is a draft/uncommitted create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub row_id: RowId,
    pub entry_id: Option<EntryId>,
    pub hours: f64,
    pub original_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridModel {
    /// Monday of the displayed week.
    pub week_start: NaiveDate,
    pub rows: Vec<Row>,
}

impl GridModel {
    pub fn new(week_start: NaiveDate) -> Self {
        Self {
            week_start: week_containing(week_start),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(week_start: NaiveDate, rows: Vec<Row>) -> Self {
        Self {
            week_start: week_containing(week_start),
            rows,
        }
    }

    pub fn date_for(&self, day: DayIndex) -> NaiveDate {
        self.week_start + Duration::days(day.index() as i64)
    }

    /// The column a date falls into, if it is inside the displayed window.
    pub fn day_for(&self, date: NaiveDate) -> Option<DayIndex> {
        let delta = (date - self.week_start).num_days();
        if (0..DAYS_PER_WEEK as i64).contains(&delta) {
            DayIndex::new(delta as u8).ok()
        } else {
            None
        }
    }

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn row_mut(&mut self, id: &RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| &r.id == id)
    }

    pub fn row_index(&self, id: &RowId) -> Option<usize> {
        self.rows.iter().position(|r| &r.id == id)
    }

    /// Locate the one cell backed by `entry` across all rows.
    pub fn locate_entry(&self, entry: EntryId) -> Option<(usize, DayIndex)> {
        for (idx, row) in self.rows.iter().enumerate() {
            for day in DayIndex::all() {
                if row.cell(day).entry_id == Some(entry) {
                    return Some((idx, day));
                }
            }
        }
        None
    }

    /// First row matching an (issue, activity) pair.
    pub fn find_by_identity(&self, issue: IssueId, activity: ActivityId) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.issue_id == Some(issue) && r.activity_id == Some(activity))
    }

    /// First row matching the full identity triple.
    pub fn find_by_triple(
        &self,
        issue: Option<IssueId>,
        activity: Option<ActivityId>,
        comment: &str,
    ) -> Option<usize> {
        self.rows.iter().position(|r| {
            r.issue_id == issue && r.activity_id == activity && r.comment == comment
        })
    }

    /// Indices of every row sharing an aggregation key.
    pub fn find_by_aggregation(&self, key: &AggregationKey) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.aggregation_key().as_ref() == Some(key))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// The underlying entries contributing to a merged cell, in row order.
    pub fn source_entries(&self, key: &AggregationKey, day: DayIndex) -> Vec<SourceEntry> {
        self.find_by_aggregation(key)
            .into_iter()
            .filter_map(|idx| {
                let row = &self.rows[idx];
                let cell = row.cell(day);
                if cell.is_empty() {
                    return None;
                }
                Some(SourceEntry {
                    row_id: row.id.clone(),
                    entry_id: cell.entry_id,
                    hours: cell.hours,
                    original_hours: cell.original_hours,
                })
            })
            .collect()
    }

    pub fn week_total(&self) -> f64 {
        self.rows.iter().map(Row::week_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(i: u8) -> DayIndex {
        DayIndex::new(i).unwrap()
    }

    #[test]
    fn week_containing_snaps_to_monday() {
        let thursday = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        assert_eq!(week_containing(thursday), monday());
        assert_eq!(week_containing(monday()), monday());
    }

    #[test]
    fn day_for_rejects_dates_outside_window() {
        let grid = GridModel::new(monday());
        assert_eq!(grid.day_for(monday()).unwrap().index(), 0);
        assert_eq!(
            grid.day_for(NaiveDate::from_ymd_opt(2024, 1, 7).unwrap())
                .unwrap()
                .index(),
            6
        );
        assert!(grid.day_for(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()).is_none());
        assert!(grid.day_for(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()).is_none());
    }

    #[test]
    fn week_total_is_recomputed() {
        let mut row = Row::new_draft(None, Some(IssueId::new(1)), Some(ActivityId::new(2)), "");
        row.cell_mut(day(0)).hours = 2.0;
        row.cell_mut(day(4)).hours = 1.5;
        assert!(hours_eq(row.week_total(), 3.5));
        row.cell_mut(day(4)).hours = 0.0;
        assert!(hours_eq(row.week_total(), 2.0));
    }

    #[test]
    fn source_entries_skip_empty_cells() {
        let key = AggregationKey {
            issue_id: IssueId::new(1),
            activity_id: ActivityId::new(2),
            comment: String::new(),
        };
        let mut a = Row::new_draft(None, Some(IssueId::new(1)), Some(ActivityId::new(2)), "");
        a.days[0] = Cell::synced(EntryId::new(10), 1.0);
        let mut b = Row::new_draft(None, Some(IssueId::new(1)), Some(ActivityId::new(2)), "");
        b.days[0] = Cell::synced(EntryId::new(11), 2.0);
        // Same identity but different comment: not part of the key.
        let c = Row::new_draft(None, Some(IssueId::new(1)), Some(ActivityId::new(2)), "other");

        let grid = GridModel::with_rows(monday(), vec![a, b, c]);
        let sources = grid.source_entries(&key, day(0));
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].entry_id, Some(EntryId::new(10)));
        assert_eq!(sources[1].entry_id, Some(EntryId::new(11)));
        assert!(grid.source_entries(&key, day(1)).is_empty());
    }
}

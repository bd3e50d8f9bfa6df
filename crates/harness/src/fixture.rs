use chrono::{Duration, NaiveDate};

use weekgrid_core::{
    ActivityId, AggregationKey, DayIndex, DraftOperation, EntryId, IssueId, ProjectId, Row, RowId,
    SourceTag,
};
use weekgrid_engine::{GridEngine, RemoteEntry};
use weekgrid_storage::SqliteKvStore;

/// Monday anchoring every scenario.
pub fn week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn day(index: u8) -> DayIndex {
    DayIndex::new(index).unwrap()
}

pub fn date_of(day_index: u8) -> NaiveDate {
    week_start() + Duration::days(day_index as i64)
}

pub fn entry(id: i64, issue: i64, activity: i64, day_index: u8, hours: f64) -> RemoteEntry {
    RemoteEntry {
        id: EntryId::new(id),
        project_id: Some(ProjectId::new(1)),
        parent_project_id: None,
        issue_id: Some(IssueId::new(issue)),
        activity_id: Some(ActivityId::new(activity)),
        comment: String::new(),
        date: date_of(day_index),
        hours,
    }
}

pub fn entry_with_comment(
    id: i64,
    issue: i64,
    activity: i64,
    day_index: u8,
    hours: f64,
    comment: &str,
) -> RemoteEntry {
    RemoteEntry {
        comment: comment.to_string(),
        ..entry(id, issue, activity, day_index, hours)
    }
}

pub fn agg_key(issue: i64, activity: i64, comment: &str) -> AggregationKey {
    AggregationKey {
        issue_id: IssueId::new(issue),
        activity_id: ActivityId::new(activity),
        comment: comment.to_string(),
    }
}

/// An engine over an in-memory store, pre-loaded with a snapshot.
pub struct TestBench {
    pub engine: GridEngine,
}

impl TestBench {
    pub fn new() -> Self {
        let kv = SqliteKvStore::open_in_memory().expect("in-memory kv store");
        Self {
            engine: GridEngine::new(week_start(), kv, SourceTag::new("test-view")),
        }
    }

    pub fn load(entries: Vec<RemoteEntry>) -> Self {
        let mut bench = Self::new();
        bench.engine.load_snapshot(entries).expect("load snapshot");
        bench
    }

    /// Defensive copy of the queue, insertion order preserved.
    pub fn ops(&self) -> Vec<DraftOperation> {
        self.engine.queue_handle().borrow().get_all()
    }

    pub fn row_id_for_entry(&self, id: i64) -> RowId {
        RowId::from_entry(EntryId::new(id))
    }

    pub fn row_for_entry(&self, id: i64) -> Row {
        let row_id = self.row_id_for_entry(id);
        self.engine
            .grid()
            .row(&row_id)
            .unwrap_or_else(|| panic!("no row for entry {id}"))
            .clone()
    }

    /// Current hours shown for a committed entry's cell.
    pub fn hours_of_entry(&self, id: i64) -> Option<f64> {
        let grid = self.engine.grid();
        grid.locate_entry(EntryId::new(id))
            .map(|(idx, day)| grid.rows[idx].cell(day).hours)
    }
}

impl Default for TestBench {
    fn default() -> Self {
        Self::new()
    }
}

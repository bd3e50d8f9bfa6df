use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::clock::Timestamp;
use crate::ids::{ActivityId, EntryId, IssueId, OpId, ProjectId};
use crate::resource::{ResourceKey, TempId};

pub const TIME_ENTRIES_PATH: &str = "/api/v3/time_entries";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestMethod {
    Post,
    Patch,
    Delete,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Mirrors the eventual REST body for a time-entry mutation. Serialized to
/// JSON verbatim when the operation is finally sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<IssueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<ActivityId>,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// The REST call a queued operation will eventually perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestCall {
    pub method: RestMethod,
    pub path: String,
    pub body: Option<EntryBody>,
}

impl RestCall {
    /// JSON triple applied verbatim by the remote client at commit time.
    pub fn to_json(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "body": self.body,
        })
    }
}

/// A queued, not-yet-sent mutation against a remote time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOperation {
    pub id: OpId,
    pub kind: OpKind,
    pub timestamp: Timestamp,
    pub resource_key: ResourceKey,
    pub resource_id: Option<EntryId>,
    pub temp_id: Option<TempId>,
    pub description: String,
    pub payload: RestCall,
}

impl DraftOperation {
    /// Create for a not-yet-saved cell. The key is derived from the target
    /// cell so repeated edits replace each other instead of piling up.
    pub fn create(
        timestamp: Timestamp,
        issue: IssueId,
        activity: ActivityId,
        temp_id: TempId,
        body: EntryBody,
    ) -> Self {
        let description = format!("log {:.2}h on #{issue} ({})", body.hours, body.date);
        Self {
            id: OpId::new(),
            kind: OpKind::Create,
            timestamp,
            resource_key: ResourceKey::New {
                issue,
                activity,
                date: body.date,
            },
            resource_id: None,
            temp_id: Some(temp_id),
            description,
            payload: RestCall {
                method: RestMethod::Post,
                path: TIME_ENTRIES_PATH.to_string(),
                body: Some(body),
            },
        }
    }

    pub fn update(timestamp: Timestamp, entry_id: EntryId, body: EntryBody) -> Self {
        let description = format!("set entry #{entry_id} to {:.2}h", body.hours);
        Self {
            id: OpId::new(),
            kind: OpKind::Update,
            timestamp,
            resource_key: ResourceKey::Saved(entry_id),
            resource_id: Some(entry_id),
            temp_id: None,
            description,
            payload: RestCall {
                method: RestMethod::Patch,
                path: format!("{TIME_ENTRIES_PATH}/{entry_id}"),
                body: Some(body),
            },
        }
    }

    pub fn delete(timestamp: Timestamp, entry_id: EntryId, date: NaiveDate) -> Self {
        Self {
            id: OpId::new(),
            kind: OpKind::Delete,
            timestamp,
            resource_key: ResourceKey::Saved(entry_id),
            resource_id: Some(entry_id),
            temp_id: None,
            description: format!("delete entry #{entry_id} ({date})"),
            payload: RestCall {
                method: RestMethod::Delete,
                path: format!("{TIME_ENTRIES_PATH}/{entry_id}"),
                body: None,
            },
        }
    }

    /// Hours carried in the payload, if any.
    pub fn hours(&self) -> Option<f64> {
        self.payload.body.as_ref().map(|b| b.hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DayIndex, RowId};

    fn body(hours: f64) -> EntryBody {
        EntryBody {
            project_id: None,
            issue_id: Some(IssueId::new(7)),
            activity_id: Some(ActivityId::new(3)),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            hours,
            comment: String::new(),
        }
    }

    #[test]
    fn create_targets_collection_path() {
        let op = DraftOperation::create(
            Timestamp::new(1, 0),
            IssueId::new(7),
            ActivityId::new(3),
            TempId::Cell {
                row: RowId::new("r1"),
                day: DayIndex::new(1).unwrap(),
            },
            body(3.0),
        );
        assert_eq!(op.kind, OpKind::Create);
        assert_eq!(op.payload.method, RestMethod::Post);
        assert_eq!(op.payload.path, "/api/v3/time_entries");
        assert_eq!(
            op.resource_key.to_string(),
            "ts:timeentry:new:7:3:2024-01-02"
        );
        assert!(op.resource_id.is_none());
    }

    #[test]
    fn update_and_delete_target_entry_path() {
        let up = DraftOperation::update(Timestamp::new(1, 0), EntryId::new(101), body(5.0));
        assert_eq!(up.payload.path, "/api/v3/time_entries/101");
        assert_eq!(up.resource_id, Some(EntryId::new(101)));

        let del = DraftOperation::delete(
            Timestamp::new(2, 0),
            EntryId::new(101),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        assert_eq!(del.payload.method, RestMethod::Delete);
        assert!(del.payload.body.is_none());
        assert_eq!(del.resource_key, up.resource_key);
    }

    #[test]
    fn rest_call_json_shape() {
        let op = DraftOperation::update(Timestamp::new(1, 0), EntryId::new(4), body(2.5));
        let value = op.payload.to_json();
        assert_eq!(value["method"], "PATCH");
        assert_eq!(value["path"], "/api/v3/time_entries/4");
        assert_eq!(value["body"]["hours"], 2.5);
        assert_eq!(value["body"]["issueId"], 7);
    }
}

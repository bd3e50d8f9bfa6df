use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::CoreError;
use crate::ids::{ActivityId, DayIndex, EntryId, IssueId, RowId};

/// Namespace prefix shared by every canonical key.
const KEY_NS: &str = "ts:timeentry";
const DATE_FMT: &str = "%Y-%m-%d";

/// Canonical identity deduplicating queued operations on the same logical
/// resource. At most one operation per key is ever queued.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// A committed remote entry.
    Saved(EntryId),
    /// A not-yet-created entry, keyed by the cell it targets so repeated
    /// edits of the same unsaved cell stay idempotent.
    New {
        issue: IssueId,
        activity: ActivityId,
        date: NaiveDate,
    },
}

impl ResourceKey {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New { .. })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(id) => write!(f, "{KEY_NS}:{id}"),
            Self::New {
                issue,
                activity,
                date,
            } => write!(
                f,
                "{KEY_NS}:new:{issue}:{activity}:{}",
                date.format(DATE_FMT)
            ),
        }
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({self})")
    }
}

impl FromStr for ResourceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(KEY_NS)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| CoreError::InvalidResourceKey(s.to_string()))?;

        if let Some(tail) = rest.strip_prefix("new:") {
            let mut parts = tail.splitn(3, ':');
            let issue = parts
                .next()
                .and_then(|p| p.parse::<IssueId>().ok())
                .ok_or_else(|| CoreError::InvalidResourceKey(s.to_string()))?;
            let activity = parts
                .next()
                .and_then(|p| p.parse::<ActivityId>().ok())
                .ok_or_else(|| CoreError::InvalidResourceKey(s.to_string()))?;
            let date = parts
                .next()
                .and_then(|p| NaiveDate::parse_from_str(p, DATE_FMT).ok())
                .ok_or_else(|| CoreError::InvalidResourceKey(s.to_string()))?;
            Ok(Self::New {
                issue,
                activity,
                date,
            })
        } else {
            rest.parse::<EntryId>()
                .map(Self::Saved)
                .map_err(|_| CoreError::InvalidResourceKey(s.to_string()))
        }
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Local correlation id for a queued create. Encodes enough to locate the
/// originating cell when the queue is replayed onto a fresh snapshot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TempId {
    /// Edit of a merged/aggregated cell.
    Aggregate {
        issue: IssueId,
        activity: ActivityId,
        comment: String,
        day: DayIndex,
    },
    /// Bulk paste. Identity lives entirely in the operation payload.
    Paste(Uuid),
    /// Ordinary single-row cell edit.
    Cell { row: RowId, day: DayIndex },
}

impl TempId {
    pub fn paste() -> Self {
        Self::Paste(Uuid::now_v7())
    }

    /// Decode an encoded temp id, trying the three shapes in order:
    /// aggregate, paste, plain cell. The cell shape splits on the *last*
    /// `:` because row ids may themselves contain `:`.
    pub fn decode(s: &str) -> Result<Self, CoreError> {
        if let Some(tail) = s.strip_prefix("agg-") {
            let mut parts = tail.splitn(3, "::");
            let issue = parts.next().and_then(|p| p.parse::<IssueId>().ok());
            let activity = parts.next().and_then(|p| p.parse::<ActivityId>().ok());
            let rest = parts.next();
            if let (Some(issue), Some(activity), Some(rest)) = (issue, activity, rest)
                && let Some((comment, day)) = rest.rsplit_once(':')
                && let Some(day) = day.parse::<u8>().ok().and_then(|d| DayIndex::new(d).ok())
            {
                return Ok(Self::Aggregate {
                    issue,
                    activity,
                    comment: comment.to_string(),
                    day,
                });
            }
            return Err(CoreError::InvalidTempId(s.to_string()));
        }

        if let Some(tail) = s.strip_prefix("draft-timeentry-") {
            return Uuid::parse_str(tail)
                .map(Self::Paste)
                .map_err(|_| CoreError::InvalidTempId(s.to_string()));
        }

        if let Some((row, day)) = s.rsplit_once(':')
            && !row.is_empty()
            && let Some(day) = day.parse::<u8>().ok().and_then(|d| DayIndex::new(d).ok())
        {
            return Ok(Self::Cell {
                row: RowId::new(row),
                day,
            });
        }

        Err(CoreError::InvalidTempId(s.to_string()))
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate {
                issue,
                activity,
                comment,
                day,
            } => write!(f, "agg-{issue}::{activity}::{comment}:{day}"),
            Self::Paste(uuid) => write!(f, "draft-timeentry-{uuid}"),
            Self::Cell { row, day } => write!(f, "{row}:{day}"),
        }
    }
}

impl fmt::Debug for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TempId({self})")
    }
}

impl Serialize for TempId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TempId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TempId::decode(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn saved_key_round_trip() {
        let key = ResourceKey::Saved(EntryId::new(101));
        assert_eq!(key.to_string(), "ts:timeentry:101");
        assert_eq!(key.to_string().parse::<ResourceKey>().unwrap(), key);
    }

    #[test]
    fn new_key_round_trip() {
        let key = ResourceKey::New {
            issue: IssueId::new(7),
            activity: ActivityId::new(3),
            date: date(2024, 1, 2),
        };
        assert_eq!(key.to_string(), "ts:timeentry:new:7:3:2024-01-02");
        assert_eq!(key.to_string().parse::<ResourceKey>().unwrap(), key);
    }

    #[test]
    fn malformed_keys_rejected() {
        assert!("ts:timeentry:".parse::<ResourceKey>().is_err());
        assert!("ts:other:5".parse::<ResourceKey>().is_err());
        assert!("ts:timeentry:new:7:3".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn aggregate_temp_id_round_trip() {
        let id = TempId::Aggregate {
            issue: IssueId::new(5),
            activity: ActivityId::new(9),
            comment: "code review".to_string(),
            day: DayIndex::new(2).unwrap(),
        };
        assert_eq!(id.to_string(), "agg-5::9::code review:2");
        assert_eq!(TempId::decode(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn aggregate_comment_may_contain_colon() {
        let decoded = TempId::decode("agg-5::9::re: standup:4").unwrap();
        match decoded {
            TempId::Aggregate { comment, day, .. } => {
                assert_eq!(comment, "re: standup");
                assert_eq!(day.index(), 4);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn paste_temp_id_round_trip() {
        let id = TempId::paste();
        let decoded = TempId::decode(&id.to_string()).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn cell_temp_id_splits_on_last_colon() {
        let decoded = TempId::decode("group:42:rowA:3").unwrap();
        match decoded {
            TempId::Cell { row, day } => {
                assert_eq!(row.as_str(), "group:42:rowA");
                assert_eq!(day.index(), 3);
            }
            other => panic!("expected cell, got {other:?}"),
        }
    }

    #[test]
    fn unknown_shapes_fail_loudly() {
        assert!(TempId::decode("no-day-suffix").is_err());
        assert!(TempId::decode("row:9").is_err()); // day out of range
        assert!(TempId::decode(":3").is_err()); // empty row id
        assert!(TempId::decode("agg-x::y::c:1").is_err());
    }
}

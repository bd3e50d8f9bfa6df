//! JSON message boundary with the rendering layer.
//!
//! The engine never touches presentation: it consumes inbound intents and
//! produces outbound messages, both as tagged JSON objects.

use serde::{Deserialize, Serialize};

use weekgrid_core::{AggregationKey, DayIndex, GridModel, OpId, Row, RowId};

use crate::GridEngine;
use crate::aggregate::{AggregatedCellConfirm, AggregatedFieldConfirm, CellEditOutcome,
    FieldEditOutcome, RowField};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    UpdateCell {
        row_id: RowId,
        day: DayIndex,
        hours: f64,
    },
    UpdateRowField {
        row_id: RowId,
        #[serde(flatten)]
        field: RowField,
    },
    DeleteRow {
        row_id: RowId,
    },
    DuplicateRow {
        row_id: Option<RowId>,
        key: Option<AggregationKey>,
    },
    CopyWeek,
    PasteWeek,
    MergeEntries {
        key: AggregationKey,
        day: DayIndex,
    },
    UpdateAggregatedCell {
        key: AggregationKey,
        day: DayIndex,
        hours: f64,
        #[serde(default)]
        confirmed: bool,
    },
    UpdateAggregatedField {
        key: AggregationKey,
        #[serde(flatten)]
        field: RowField,
        #[serde(default)]
        confirmed: bool,
    },
    RestoreAggregatedEntries {
        key: AggregationKey,
        day: DayIndex,
    },
    UndoPaste {
        op_ids: Vec<OpId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    Render {
        grid: GridModel,
    },
    UpdateRow {
        row: Row,
    },
    RowDeleted {
        row_id: RowId,
    },
    RowDuplicated {
        row_id: RowId,
    },
    RequestAggregatedCellConfirm(AggregatedCellConfirm),
    RequestAggregatedFieldConfirm(AggregatedFieldConfirm),
    ShowToast {
        message: String,
    },
    PasteComplete {
        op_ids: Vec<OpId>,
    },
}

impl GridEngine {
    /// Single entry point for the UI. Expected no-op conditions produce no
    /// messages; real failures surface as a toast.
    pub fn handle_message(&mut self, msg: Inbound) -> Vec<Outbound> {
        match self.dispatch(msg) {
            Ok(out) => out,
            Err(err) => vec![Outbound::ShowToast {
                message: format!("operation failed: {err}"),
            }],
        }
    }

    fn dispatch(&mut self, msg: Inbound) -> Result<Vec<Outbound>, EngineError> {
        match msg {
            Inbound::UpdateCell { row_id, day, hours } => {
                self.update_cell(&row_id, day, hours)?;
                Ok(self.row_update_or_render(&row_id))
            }

            Inbound::UpdateRowField { row_id, field } => {
                self.update_row_field(&row_id, field)?;
                Ok(self.row_update_or_render(&row_id))
            }

            Inbound::DeleteRow { row_id } => {
                if self.delete_row(&row_id)? {
                    Ok(vec![Outbound::RowDeleted { row_id }])
                } else {
                    Ok(Vec::new())
                }
            }

            Inbound::DuplicateRow { row_id, key } => {
                let new_id = match (row_id, key) {
                    (Some(row_id), _) => self.duplicate_row(&row_id)?,
                    (None, Some(key)) => self.duplicate_aggregated(&key)?,
                    (None, None) => None,
                };
                Ok(match new_id {
                    Some(row_id) => vec![Outbound::RowDuplicated { row_id }, self.render()],
                    None => Vec::new(),
                })
            }

            Inbound::CopyWeek => {
                let count = self.copy_week();
                Ok(vec![Outbound::ShowToast {
                    message: format!("copied {count} entries"),
                }])
            }

            Inbound::PasteWeek => {
                let op_ids = self.paste_week()?;
                Ok(vec![Outbound::PasteComplete { op_ids }, self.render()])
            }

            Inbound::MergeEntries { key, day } => {
                if self.merge_entries(&key, day)? {
                    Ok(vec![self.render()])
                } else {
                    Ok(vec![Outbound::ShowToast {
                        message: "nothing to merge".to_string(),
                    }])
                }
            }

            Inbound::UpdateAggregatedCell {
                key,
                day,
                hours,
                confirmed,
            } => match self.update_aggregated_cell(&key, day, hours, confirmed)? {
                CellEditOutcome::Applied => Ok(vec![self.render()]),
                CellEditOutcome::ConfirmationRequired(confirm) => {
                    Ok(vec![Outbound::RequestAggregatedCellConfirm(confirm)])
                }
            },

            Inbound::UpdateAggregatedField {
                key,
                field,
                confirmed,
            } => match self.update_aggregated_field(&key, field, confirmed)? {
                FieldEditOutcome::Applied => Ok(vec![self.render()]),
                FieldEditOutcome::ConfirmationRequired(confirm) => {
                    Ok(vec![Outbound::RequestAggregatedFieldConfirm(confirm)])
                }
            },

            Inbound::RestoreAggregatedEntries { key, day } => {
                self.restore_aggregated_entries(&key, day)?;
                Ok(vec![self.render()])
            }

            Inbound::UndoPaste { op_ids } => {
                self.undo_paste(&op_ids)?;
                Ok(vec![self.render()])
            }
        }
    }

    fn render(&self) -> Outbound {
        Outbound::Render {
            grid: self.grid.clone(),
        }
    }

    fn row_update_or_render(&self, row_id: &RowId) -> Vec<Outbound> {
        match self.grid.row(row_id) {
            Some(row) => vec![Outbound::UpdateRow { row: row.clone() }],
            None => vec![self.render()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_update_cell_parses() {
        let msg: Inbound = serde_json::from_str(
            r#"{"type":"updateCell","rowId":"entry-101","day":0,"hours":5.0}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::UpdateCell {
                row_id: RowId::new("entry-101"),
                day: DayIndex::new(0).unwrap(),
                hours: 5.0,
            }
        );
    }

    #[test]
    fn inbound_aggregated_cell_defaults_unconfirmed() {
        let msg: Inbound = serde_json::from_str(
            r#"{
                "type": "updateAggregatedCell",
                "key": {"issueId": 5, "activityId": 9, "comment": ""},
                "day": 2,
                "hours": 4.0
            }"#,
        )
        .unwrap();
        match msg {
            Inbound::UpdateAggregatedCell { confirmed, .. } => assert!(!confirmed),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn inbound_field_edit_flattens_field() {
        let msg: Inbound = serde_json::from_str(
            r#"{"type":"updateRowField","rowId":"r1","field":"activity","value":12}"#,
        )
        .unwrap();
        match msg {
            Inbound::UpdateRowField { field, .. } => {
                assert_eq!(field, RowField::Activity(weekgrid_core::ActivityId::new(12)));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn outbound_confirm_carries_count() {
        let out = Outbound::RequestAggregatedCellConfirm(AggregatedCellConfirm {
            key: AggregationKey {
                issue_id: weekgrid_core::IssueId::new(5),
                activity_id: weekgrid_core::ActivityId::new(9),
                comment: String::new(),
            },
            day: DayIndex::new(2).unwrap(),
            proposed_hours: 4.0,
            source_entry_count: 2,
        });
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["type"], "requestAggregatedCellConfirm");
        assert_eq!(value["sourceEntryCount"], 2);
        assert_eq!(value["proposedHours"], 4.0);
    }
}

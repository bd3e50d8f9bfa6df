use weekgrid_core::{ActivityId, EntryId, OpKind, grid::hours_eq};
use weekgrid_engine::{CellEditOutcome, FieldEditOutcome, Inbound, Outbound, RowField};
use weekgrid_harness::TestBench;
use weekgrid_harness::fixture::{agg_key, day, entry};

// ============================================================================
// Confirmation gate (cardinality > 1)
// ============================================================================

#[test]
fn scenario_c_two_entries_need_confirmation() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0), entry(11, 5, 9, 0, 2.0)]);
    let key = agg_key(5, 9, "");

    // Unconfirmed: no mutation, only a confirmation request.
    let outcome = bench
        .engine
        .update_aggregated_cell(&key, day(0), 4.0, false)?;
    match outcome {
        CellEditOutcome::ConfirmationRequired(confirm) => {
            assert_eq!(confirm.source_entry_count, 2);
            assert!(hours_eq(confirm.proposed_hours, 4.0));
            assert_eq!(confirm.key, key);
        }
        CellEditOutcome::Applied => panic!("destructive edit applied without confirmation"),
    }
    assert!(bench.ops().is_empty());
    assert!(hours_eq(bench.hours_of_entry(10).unwrap(), 1.0));

    // Confirmed: one delete per source entry, then one create for the
    // merged value.
    let outcome = bench.engine.update_aggregated_cell(&key, day(0), 4.0, true)?;
    assert_eq!(outcome, CellEditOutcome::Applied);

    let ops = bench.ops();
    assert_eq!(ops.len(), 3);
    assert_eq!(ops[0].kind, OpKind::Delete);
    assert_eq!(ops[0].resource_id, Some(EntryId::new(10)));
    assert_eq!(ops[1].kind, OpKind::Delete);
    assert_eq!(ops[1].resource_id, Some(EntryId::new(11)));
    assert_eq!(ops[2].kind, OpKind::Create);
    assert_eq!(ops[2].hours(), Some(4.0));
    Ok(())
}

#[test]
fn confirmed_edit_conserves_hours() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![
        entry(10, 5, 9, 0, 1.0),
        entry(11, 5, 9, 0, 2.0),
        entry(12, 5, 9, 0, 3.0),
    ]);
    let key = agg_key(5, 9, "");

    bench.engine.update_aggregated_cell(&key, day(0), 7.0, true)?;

    let ops = bench.ops();
    let deletes: Vec<_> = ops.iter().filter(|op| op.kind == OpKind::Delete).collect();
    let creates: Vec<_> = ops.iter().filter(|op| op.kind == OpKind::Create).collect();
    assert_eq!(deletes.len(), 3);
    assert_eq!(creates.len(), 1);

    // No loss, no duplication: the create carries exactly the new value.
    let created: f64 = creates.iter().filter_map(|op| op.hours()).sum();
    assert!(hours_eq(created, 7.0));
    Ok(())
}

#[test]
fn confirmed_zero_deletes_everything() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0), entry(11, 5, 9, 0, 2.0)]);
    let key = agg_key(5, 9, "");

    bench.engine.update_aggregated_cell(&key, day(0), 0.0, true)?;

    let ops = bench.ops();
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| op.kind == OpKind::Delete));
    assert!(hours_eq(bench.engine.grid().week_total(), 0.0));
    Ok(())
}

// ============================================================================
// Cardinality 0 and 1 behave like a plain cell edit
// ============================================================================

#[test]
fn empty_merged_cell_creates_and_retracts() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0)]);
    let key = agg_key(5, 9, "");

    // Day 3 has no contributions: a create is queued against the identity row.
    let outcome = bench.engine.update_aggregated_cell(&key, day(3), 2.0, false)?;
    assert_eq!(outcome, CellEditOutcome::Applied);
    let ops = bench.ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OpKind::Create);
    assert!(hours_eq(
        bench.engine.grid().rows[0].cell(day(3)).hours,
        2.0
    ));

    // Draft contribution now exists; replacing and zeroing dedups to one key.
    bench.engine.update_aggregated_cell(&key, day(3), 3.5, false)?;
    let ops = bench.ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].hours(), Some(3.5));

    bench.engine.update_aggregated_cell(&key, day(3), 0.0, false)?;
    assert!(bench.ops().is_empty());
    Ok(())
}

#[test]
fn single_saved_entry_resolves_like_plain_edit() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.5)]);
    let key = agg_key(5, 9, "");

    bench.engine.update_aggregated_cell(&key, day(0), 4.0, false)?;
    let ops = bench.ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OpKind::Update);
    assert_eq!(ops[0].resource_id, Some(EntryId::new(10)));

    // Back to the original: the pending op is dropped.
    bench.engine.update_aggregated_cell(&key, day(0), 1.5, false)?;
    assert!(bench.ops().is_empty());

    // Zero: a delete is queued.
    bench.engine.update_aggregated_cell(&key, day(0), 0.0, false)?;
    let ops = bench.ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OpKind::Delete);
    Ok(())
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn merge_keeps_lowest_id_and_conserves_hours() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![
        entry(11, 5, 9, 0, 2.0),
        entry(10, 5, 9, 0, 1.0),
        entry(12, 5, 9, 0, 0.5),
    ]);
    let key = agg_key(5, 9, "");

    assert!(bench.engine.merge_entries(&key, day(0))?);

    let ops = bench.ops();
    assert_eq!(ops.len(), 3);

    let update = ops.iter().find(|op| op.kind == OpKind::Update).unwrap();
    assert_eq!(update.resource_id, Some(EntryId::new(10)));
    assert!(hours_eq(update.hours().unwrap(), 3.5));

    let deleted: Vec<_> = ops
        .iter()
        .filter(|op| op.kind == OpKind::Delete)
        .filter_map(|op| op.resource_id)
        .collect();
    assert_eq!(deleted, vec![EntryId::new(11), EntryId::new(12)]);
    Ok(())
}

#[test]
fn merge_needs_two_saved_entries() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0)]);
    let key = agg_key(5, 9, "");
    assert!(!bench.engine.merge_entries(&key, day(0))?);
    assert!(bench.ops().is_empty());
    Ok(())
}

// ============================================================================
// Aggregated field edits
// ============================================================================

#[test]
fn aggregated_field_edit_gates_and_fans_out() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0), entry(11, 5, 9, 1, 2.0)]);
    let key = agg_key(5, 9, "");
    let field = RowField::Activity(ActivityId::new(12));

    let outcome = bench
        .engine
        .update_aggregated_field(&key, field.clone(), false)?;
    match outcome {
        FieldEditOutcome::ConfirmationRequired(confirm) => {
            assert_eq!(confirm.source_row_count, 2);
        }
        FieldEditOutcome::Applied => panic!("multi-row field edit applied without confirmation"),
    }
    assert!(bench.ops().is_empty());

    let outcome = bench.engine.update_aggregated_field(&key, field, true)?;
    assert_eq!(outcome, FieldEditOutcome::Applied);

    // Each source row went through the normal single-row update path.
    let ops = bench.ops();
    assert_eq!(ops.len(), 2);
    for op in &ops {
        assert_eq!(op.kind, OpKind::Update);
        assert_eq!(
            op.payload.body.as_ref().unwrap().activity_id,
            Some(ActivityId::new(12))
        );
    }
    for row in &bench.engine.grid().rows {
        assert_eq!(row.activity_id, Some(ActivityId::new(12)));
    }
    Ok(())
}

// ============================================================================
// Restore after a confirmed aggregated deletion
// ============================================================================

#[test]
fn restore_undoes_confirmed_deletion() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0), entry(11, 5, 9, 0, 2.0)]);
    let key = agg_key(5, 9, "");

    bench.engine.update_aggregated_cell(&key, day(0), 0.0, true)?;
    assert_eq!(bench.ops().len(), 2);
    assert!(hours_eq(bench.engine.grid().week_total(), 0.0));

    bench.engine.restore_aggregated_entries(&key, day(0))?;
    assert!(bench.ops().is_empty());
    assert!(hours_eq(bench.hours_of_entry(10).unwrap(), 1.0));
    assert!(hours_eq(bench.hours_of_entry(11).unwrap(), 2.0));
    Ok(())
}

// ============================================================================
// Message-protocol flow for the confirmation gate
// ============================================================================

#[test]
fn protocol_surfaces_confirmation_request() {
    let mut bench = TestBench::load(vec![entry(10, 5, 9, 0, 1.0), entry(11, 5, 9, 0, 2.0)]);

    let inbound: Inbound = serde_json::from_str(
        r#"{
            "type": "updateAggregatedCell",
            "key": {"issueId": 5, "activityId": 9, "comment": ""},
            "day": 0,
            "hours": 4.0
        }"#,
    )
    .unwrap();

    let out = bench.engine.handle_message(inbound);
    assert_eq!(out.len(), 1);
    match &out[0] {
        Outbound::RequestAggregatedCellConfirm(confirm) => {
            assert_eq!(confirm.source_entry_count, 2);
        }
        other => panic!("expected confirmation request, got {other:?}"),
    }
    assert!(bench.ops().is_empty());

    // The confirmed resend mutates and renders.
    let confirmed: Inbound = serde_json::from_str(
        r#"{
            "type": "updateAggregatedCell",
            "key": {"issueId": 5, "activityId": 9, "comment": ""},
            "day": 0,
            "hours": 4.0,
            "confirmed": true
        }"#,
    )
    .unwrap();
    let out = bench.engine.handle_message(confirmed);
    assert!(matches!(out[0], Outbound::Render { .. }));
    assert_eq!(bench.ops().len(), 3);
}

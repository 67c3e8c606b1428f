//! Saves and the approval ladder

use dh_engine::{EngineConfig, EngineError, Permissions};
use dh_model::{fields, AggregateId, Record, RowId, RowStatus, SectionKey, ValidationStatus, WorkflowAction};
use dh_test_utils::{fixtures, setup, setup_loaded, setup_with};
use pretty_assertions::assert_eq;
use serde_json::json;

fn collar() -> SectionKey {
    SectionKey::new(fixtures::COLLAR)
}

/// A blocking error stops submit before anything is written
#[tokio::test]
async fn test_submit_blocked_by_validation() {
    let bench = setup_loaded().await;
    bench
        .editor
        .update_section_data(&collar(), &Record::new().with("HoleId", ""))
        .unwrap();

    let err = bench.editor.submit_section(&collar()).await.unwrap_err();
    let EngineError::Validation { errors, .. } = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "REQUIRED");

    let section = bench.editor.section(&collar()).unwrap();
    assert_eq!(section.status(), RowStatus::Draft);
    assert!(section.is_dirty());
    assert_eq!(bench.backend.write_calls(), 0);
}

#[tokio::test]
async fn test_submit_stamps_status_and_validation() {
    let bench = setup_loaded().await;
    let outcome = bench.editor.submit_section(&collar()).await.unwrap();

    assert_eq!(outcome.status, RowStatus::Submitted);
    assert_eq!(outcome.validation, ValidationStatus::Valid);
    assert_eq!(outcome.rows_written, 1);
    assert!(outcome.warnings.is_empty());

    let stored = bench.backend.row(&bench.hole, fixtures::COLLAR, "C-1").unwrap();
    assert_eq!(stored.get(fields::ROW_STATUS), Some(&json!(1)));
    assert_eq!(stored.get(fields::VALIDATION_STATUS), Some(&json!(1)));
    assert_eq!(stored.text(fields::MODIFIED_BY), Some("geo1"));
    assert!(!bench.editor.has_unsaved_changes());
}

/// Warnings never block a save; they are reported and stamped
#[tokio::test]
async fn test_save_with_warnings() {
    let bench = setup_loaded().await;
    bench
        .editor
        .update_section_data(&collar(), &Record::new().with("Azimuth", serde_json::Value::Null))
        .unwrap();

    let outcome = bench.editor.save_section(&collar()).await.unwrap();
    assert_eq!(outcome.validation, ValidationStatus::HasWarnings);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].code, "MISSING_AZIMUTH");

    let stored = bench.backend.row(&bench.hole, fixtures::COLLAR, "C-1").unwrap();
    assert_eq!(stored.get(fields::VALIDATION_STATUS), Some(&json!(2)));
    assert_eq!(stored.get("Azimuth"), Some(&json!(null)));
}

/// Submit, review and approve in turn
#[tokio::test]
async fn test_full_approval_ladder() {
    let bench = setup_loaded().await;
    bench.editor.submit_section(&collar()).await.unwrap();
    let reviewed = bench.editor.review_section(&collar()).await.unwrap();
    assert_eq!(reviewed.status, RowStatus::Reviewed);

    let approved = bench.editor.approve_section(&collar()).await.unwrap();
    assert_eq!(approved.status, RowStatus::Approved);

    let stored = bench.backend.row(&bench.hole, fixtures::COLLAR, "C-1").unwrap();
    assert_eq!(stored.row_status(), RowStatus::Approved);
    assert_eq!(stored.text(fields::REVIEWED_BY), Some("geo1"));
    assert_eq!(stored.text(fields::APPROVED_BY), Some("geo1"));
    assert!(stored.report_included());
    assert_eq!(bench.backend.update_calls(), 3);
}

/// Reject returns an approved record to draft and clears its stale error text
#[tokio::test]
async fn test_reject_from_approved() {
    let bench = setup();
    let hole = AggregateId::new("DH-3");
    let mut aggregate = fixtures::hole("DH-3");
    aggregate.sections.insert(
        collar(),
        vec![fixtures::record(json!({
            "CollarId": "C-3", "DrillHoleId": "DH-3", "HoleId": "DH-003", "Azimuth": 90,
            "RowStatus": 3, "ValidationErrors": "legacy", "ReportIncludeInd": true,
            "ApprovedBy": "chief", "ModifiedOnDt": "2020-01-01T00:00:00.000Z"
        }))],
    );
    bench.backend.seed(aggregate);
    bench.editor.load_aggregate(&hole, false).await.unwrap();
    assert!(!bench.editor.can_edit(&collar(), None));

    let outcome = bench.editor.reject_section(&collar()).await.unwrap();
    assert_eq!(outcome.status, RowStatus::Draft);

    let stored = bench.backend.row(&hole, fixtures::COLLAR, "C-3").unwrap();
    assert_eq!(stored.get(fields::ROW_STATUS), Some(&json!(0)));
    assert_eq!(stored.get(fields::VALIDATION_ERRORS), Some(&json!(null)));
    assert_eq!(stored.get(fields::APPROVED_BY), Some(&json!(null)));
    assert!(!stored.report_included());
    assert_ne!(stored.text(fields::MODIFIED_ON), Some("2020-01-01T00:00:00.000Z"));
    assert!(bench.editor.can_edit(&collar(), None));
}

#[tokio::test]
async fn test_review_requires_permission() {
    let bench = setup_with(fixtures::registry(), EngineConfig::new("field-tech"));
    bench.editor.load_aggregate(&bench.hole, false).await.unwrap();
    bench.editor.submit_section(&collar()).await.unwrap();

    let err = bench.editor.review_section(&collar()).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Forbidden {
            section: collar(),
            action: WorkflowAction::Review,
        }
    );
    assert_eq!(bench.editor.section(&collar()).unwrap().status(), RowStatus::Submitted);
}

#[tokio::test]
async fn test_approve_needs_approve_permission_only() {
    let permissions = Permissions {
        review: true,
        ..Permissions::default()
    };
    let bench = setup_with(fixtures::registry(), EngineConfig::new("lead").with_permissions(permissions));
    bench.editor.load_aggregate(&bench.hole, false).await.unwrap();
    bench.editor.submit_section(&collar()).await.unwrap();
    bench.editor.review_section(&collar()).await.unwrap();

    let err = bench.editor.approve_section(&collar()).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { action: WorkflowAction::Approve, .. }));
}

#[tokio::test]
async fn test_approve_from_draft_is_invalid() {
    let bench = setup_loaded().await;
    let err = bench.editor.approve_section(&collar()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert_eq!(bench.backend.write_calls(), 0);
}

/// Submitted sections refuse field edits
#[tokio::test]
async fn test_submitted_section_is_locked() {
    let bench = setup_loaded().await;
    assert!(bench.editor.can_edit(&collar(), None));
    bench.editor.submit_section(&collar()).await.unwrap();

    let err = bench
        .editor
        .update_section_data(&collar(), &Record::new().with("Dip", -80))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Locked {
            section: collar(),
            status: RowStatus::Submitted,
        }
    );
    assert!(!bench.editor.can_edit(&collar(), None));
}

#[tokio::test]
async fn test_clean_save_writes_nothing() {
    let bench = setup_loaded().await;
    let outcome = bench.editor.save_section(&collar()).await.unwrap();
    assert!(outcome.is_noop());
    assert_eq!(outcome.status, RowStatus::Draft);
    assert_eq!(bench.backend.write_calls(), 0);
}

/// Workflow-owned fields in a field edit are ignored
#[tokio::test]
async fn test_field_edit_cannot_set_status() {
    let bench = setup_loaded().await;
    bench
        .editor
        .update_section_data(&collar(), &Record::new().with(fields::ROW_STATUS, 3).with("Dip", -65))
        .unwrap();

    let section = bench.editor.section(&collar()).unwrap();
    let data = section.as_single().unwrap().data().clone();
    assert_eq!(data.row_status(), RowStatus::Draft);
    assert_eq!(data.get("Dip"), Some(&json!(-65)));
}

#[tokio::test]
async fn test_report_inclusion_on_approved_section() {
    let bench = setup_loaded().await;
    let err = bench.editor.set_report_inclusion(&collar(), false).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    bench.editor.submit_section(&collar()).await.unwrap();
    bench.editor.review_section(&collar()).await.unwrap();
    bench.editor.approve_section(&collar()).await.unwrap();

    let excluded = bench.editor.set_report_inclusion(&collar(), false).await.unwrap();
    assert_eq!(excluded.status, RowStatus::Approved);
    assert!(!bench.backend.row(&bench.hole, fixtures::COLLAR, "C-1").unwrap().report_included());

    let writes = bench.backend.write_calls();
    let again = bench.editor.set_report_inclusion(&collar(), false).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(bench.backend.write_calls(), writes);
}

/// Collection actions move every live row together
#[tokio::test]
async fn test_collection_submit_moves_all_rows() {
    let bench = setup_loaded().await;
    let geology = SectionKey::new(fixtures::GEOLOGY);

    let outcome = bench.editor.submit_section(&geology).await.unwrap();
    assert_eq!(outcome.status, RowStatus::Submitted);
    assert_eq!(outcome.rows_written, 2);

    for row in ["GL-1", "GL-2"] {
        let stored = bench.backend.row(&bench.hole, fixtures::GEOLOGY, row).unwrap();
        assert_eq!(stored.row_status(), RowStatus::Submitted);
    }
    assert_eq!(bench.editor.section(&geology).unwrap().status(), RowStatus::Submitted);

    let err = bench
        .editor
        .add_row(&geology, &Record::new().with("DepthFrom", 9).with("DepthTo", 12))
        .unwrap_err();
    assert!(matches!(err, EngineError::Locked { .. }));
    assert!(!bench.editor.can_edit(&geology, Some(&RowId::new("GL-1"))));
}

/// One invalid row blocks the whole collection action
#[tokio::test]
async fn test_collection_submit_blocked_by_one_row() {
    let bench = setup_loaded().await;
    let geology = SectionKey::new(fixtures::GEOLOGY);
    bench
        .editor
        .update_row(&geology, &RowId::new("GL-2"), &Record::new().with("DepthTo", 2))
        .unwrap();

    let err = bench.editor.submit_section(&geology).await.unwrap_err();
    let EngineError::Validation { errors, .. } = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors[0].code, "DEPTH_ORDER");
    assert_eq!(bench.backend.write_calls(), 0);
    assert_eq!(bench.editor.section(&geology).unwrap().status(), RowStatus::Draft);
}

/// Rejecting an approved collection returns every row to draft
#[tokio::test]
async fn test_collection_reject_returns_rows_to_draft() {
    let bench = setup_loaded().await;
    let geology = SectionKey::new(fixtures::GEOLOGY);
    bench.editor.submit_section(&geology).await.unwrap();
    bench.editor.review_section(&geology).await.unwrap();
    let approved = bench.editor.approve_section(&geology).await.unwrap();
    assert_eq!(approved.status, RowStatus::Approved);

    let approved_on: Vec<_> = ["GL-1", "GL-2"]
        .iter()
        .map(|row| {
            let stored = bench.backend.row(&bench.hole, fixtures::GEOLOGY, row).unwrap();
            assert!(stored.report_included());
            stored.get(fields::MODIFIED_ON).cloned().unwrap()
        })
        .collect();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let outcome = bench.editor.reject_section(&geology).await.unwrap();
    assert_eq!(outcome.status, RowStatus::Draft);
    assert_eq!(outcome.rows_written, 2);

    for (row, before) in ["GL-1", "GL-2"].iter().zip(approved_on) {
        let stored = bench.backend.row(&bench.hole, fixtures::GEOLOGY, row).unwrap();
        assert_eq!(stored.get(fields::ROW_STATUS), Some(&json!(0)));
        assert_eq!(stored.get(fields::VALIDATION_ERRORS), Some(&json!(null)));
        assert_eq!(stored.get(fields::APPROVED_BY), Some(&json!(null)));
        assert!(!stored.report_included());
        assert_ne!(stored.get(fields::MODIFIED_ON), Some(&before));
    }

    let section = bench.editor.section(&geology).unwrap();
    assert_eq!(section.status(), RowStatus::Draft);
    assert!(!section.is_dirty());
    assert!(bench.editor.can_edit(&geology, Some(&RowId::new("GL-1"))));
}

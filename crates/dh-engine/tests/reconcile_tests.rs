//! Background changes applied to a loaded aggregate

use dh_engine::ReconcileReport;
use dh_model::{Record, RowId, SectionKey};
use dh_test_utils::{fixtures, setup_loaded, TestBench};
use pretty_assertions::assert_eq;
use serde_json::json;

fn survey() -> SectionKey {
    SectionKey::new(fixtures::SURVEY)
}

fn geology() -> SectionKey {
    SectionKey::new(fixtures::GEOLOGY)
}

fn incoming(bench: &TestBench) -> dh_model::Aggregate {
    bench.backend.stored(&bench.hole).unwrap()
}

fn survey_dip(bench: &TestBench) -> Option<serde_json::Value> {
    let section = bench.editor.section(&survey()).unwrap();
    section.as_collection().unwrap().row(&RowId::new("SV-1"))?.get("Dip").cloned()
}

/// Clean sections take the incoming state; unchanged ones are left alone
#[tokio::test]
async fn test_clean_section_adopts_change() {
    let bench = setup_loaded().await;
    bench
        .backend
        .edit_remotely(&bench.hole, fixtures::SURVEY, "SV-1", &Record::new().with("Dip", -55))
        .unwrap();

    let report = bench.editor.reconcile(&incoming(&bench));
    assert_eq!(
        report,
        ReconcileReport {
            adopted: vec![survey()],
            ..ReconcileReport::default()
        }
    );
    assert_eq!(survey_dip(&bench), Some(json!(-55)));
    assert!(!bench.editor.has_unsaved_changes());
}

/// A dirty section whose edits already landed elsewhere becomes clean
#[tokio::test]
async fn test_dirty_section_confirmed() {
    let bench = setup_loaded().await;
    let gl1 = RowId::new("GL-1");
    bench
        .editor
        .update_row(&geology(), &gl1, &Record::new().with("Lithology", "QTZ"))
        .unwrap();
    bench
        .backend
        .edit_remotely(&bench.hole, fixtures::GEOLOGY, "GL-1", &Record::new().with("Lithology", "QTZ"))
        .unwrap();

    let report = bench.editor.reconcile(&incoming(&bench));
    assert_eq!(report.confirmed, vec![geology()]);
    assert!(!bench.editor.has_unsaved_changes());

    let stored = bench.backend.row(&bench.hole, fixtures::GEOLOGY, "GL-1").unwrap();
    let section = bench.editor.section(&geology()).unwrap();
    assert_eq!(section.as_collection().unwrap().version(&gl1), stored.version().as_ref());
}

/// Unconfirmed edits are kept; rows changed underneath are flagged stale
#[tokio::test]
async fn test_dirty_section_keeps_edits_and_flags_stale_rows() {
    let bench = setup_loaded().await;
    let (gl1, gl2) = (RowId::new("GL-1"), RowId::new("GL-2"));
    bench
        .editor
        .update_row(&geology(), &gl1, &Record::new().with("Lithology", "QTZ"))
        .unwrap();
    bench
        .backend
        .edit_remotely(&bench.hole, fixtures::GEOLOGY, "GL-2", &Record::new().with("Lithology", "DOL"))
        .unwrap();

    let report = bench.editor.reconcile(&incoming(&bench));
    assert_eq!(report.kept, vec![geology()]);
    assert_eq!(report.stale_rows, vec![(geology(), gl2.clone())]);

    let section = bench.editor.section(&geology()).unwrap();
    let store = section.as_collection().unwrap();
    assert_eq!(store.row(&gl1).unwrap().text("Lithology"), Some("QTZ"));
    assert_eq!(store.row(&gl2).unwrap().text("Lithology"), Some("BSLT"));
    assert!(store.metadata(&gl2).unwrap().is_stale);
    assert!(!store.metadata(&gl1).unwrap().is_stale);

    let again = bench.editor.reconcile(&incoming(&bench));
    assert!(again.stale_rows.is_empty());

    bench.editor.save_section(&geology()).await.unwrap();
    assert_eq!(
        bench.backend.row(&bench.hole, fixtures::GEOLOGY, "GL-1").unwrap().text("Lithology"),
        Some("QTZ")
    );
}

#[tokio::test]
async fn test_change_for_other_aggregate_is_ignored() {
    let bench = setup_loaded().await;
    let report = bench.editor.reconcile(&fixtures::hole("DH-9"));
    assert!(report.is_empty());
    assert!(report.skipped.is_empty());
}

/// A section with a write in flight is left for the next change
#[tokio::test]
async fn test_busy_section_is_skipped() {
    let bench = setup_loaded().await;
    let collar = SectionKey::new(fixtures::COLLAR);
    bench
        .editor
        .update_section_data(&collar, &Record::new().with("Dip", -62))
        .unwrap();

    let gate = bench.backend.pause_writes().await;
    let save = {
        let editor = bench.editor.clone();
        let collar = collar.clone();
        tokio::spawn(async move { editor.save_section(&collar).await })
    };
    while bench.backend.update_calls() == 0 {
        tokio::task::yield_now().await;
    }

    let report = bench.editor.reconcile(&incoming(&bench));
    assert_eq!(report.skipped, vec![collar.clone()]);

    drop(gate);
    save.await.unwrap().unwrap();
    assert!(!bench.editor.has_unsaved_changes());
}

/// Changes pushed on the source's live feed are applied in the background
#[tokio::test]
async fn test_live_feed_reconciles() {
    let bench = setup_loaded().await;
    let task = bench.editor.spawn_live_reconciliation().unwrap();

    bench
        .backend
        .edit_remotely(&bench.hole, fixtures::SURVEY, "SV-1", &Record::new().with("Dip", -55))
        .unwrap();
    assert!(bench.backend.publish(&bench.hole));

    for _ in 0..100 {
        if survey_dip(&bench) == Some(json!(-55)) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(survey_dip(&bench), Some(json!(-55)));
    task.abort();
}

#[tokio::test]
async fn test_live_feed_needs_a_loaded_aggregate() {
    let bench = dh_test_utils::setup();
    assert!(bench.editor.spawn_live_reconciliation().is_none());
}

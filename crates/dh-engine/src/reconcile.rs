//! Background change reconciliation
//!
//! When the aggregate changes underneath the editor (another device synced,
//! a background refresh landed), each section is reconciled on its own:
//!
//! - clean sections take the incoming state
//! - dirty sections whose edits the incoming state already holds reset to it
//! - other dirty sections keep their edits; collection rows with a newer
//!   stored version are flagged stale
//!
//! Sections with an operation in flight are left for the next change.

use crate::loader::{map_sections, same_state};
use crate::state::EngineState;
use crate::types::ReconcileReport;
use dh_model::{fields, Aggregate, Record, RowId};
use dh_store::{CollectionSectionStore, Section};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Apply an incoming aggregate to the loaded sections
pub(crate) fn apply(state: &EngineState, aggregate: &Aggregate) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let fresh = match map_sections(&state.registry, aggregate, &state.config.parent_id_field) {
        Ok(fresh) => fresh,
        Err(err) => {
            warn!(aggregate = %aggregate.id, error = %err, "ignoring malformed background change");
            return report;
        }
    };

    let mut loaded = state.loaded.write();
    if loaded.parent.as_ref() != Some(&aggregate.id) {
        debug!(aggregate = %aggregate.id, "background change for another aggregate");
        return report;
    }

    for (key, mapped) in fresh {
        if state.guards.is_busy(&key) {
            report.skipped.push(key);
            continue;
        }
        let Some(current) = loaded.sections.get_mut(&key) else {
            continue;
        };

        if !current.is_dirty() {
            if !same_state(current, &mapped.section) {
                *current = mapped.section;
                report.adopted.push(key);
            }
        } else if edits_confirmed(current, &mapped.section) {
            *current = mapped.section;
            report.confirmed.push(key);
        } else {
            if let (Section::Collection(local), Section::Collection(incoming)) = (current, &mapped.section) {
                for id in mark_stale_rows(local, incoming) {
                    report.stale_rows.push((key.clone(), id));
                }
            }
            report.kept.push(key);
        }
    }

    if !report.is_empty() {
        debug!(
            aggregate = %aggregate.id,
            adopted = report.adopted.len(),
            confirmed = report.confirmed.len(),
            kept = report.kept.len(),
            stale = report.stale_rows.len(),
            "background change reconciled"
        );
    }
    report
}

/// Whether the incoming section already holds every local edit
fn edits_confirmed(local: &Section, incoming: &Section) -> bool {
    match (local, incoming) {
        (Section::Single(local), Section::Single(incoming)) => {
            !incoming.is_new() && local.data().same_content(incoming.data(), fields::BOOKKEEPING)
        }
        (Section::Collection(local), Section::Collection(incoming)) => rows_confirmed(local, incoming),
        _ => false,
    }
}

fn rows_confirmed(local: &CollectionSectionStore, incoming: &CollectionSectionStore) -> bool {
    let field = local.id_field();
    let stored: HashMap<RowId, &Record> = incoming
        .data()
        .iter()
        .filter_map(|row| Some((row.row_id(field)?, row)))
        .collect();

    let mut seen = 0;
    for row in local.data() {
        let Some(id) = row.row_id(field) else {
            return false;
        };
        let deleted = local.metadata(&id).is_some_and(|meta| meta.is_deleted);
        match (stored.get(&id), deleted) {
            (Some(theirs), true) => {
                seen += 1;
                if theirs.is_active() {
                    return false;
                }
            }
            (Some(theirs), false) => {
                seen += 1;
                if !row.same_content(theirs, fields::BOOKKEEPING) {
                    return false;
                }
            }
            (None, true) => {}
            (None, false) => return false,
        }
    }
    seen == stored.len()
}

fn mark_stale_rows(local: &mut CollectionSectionStore, incoming: &CollectionSectionStore) -> Vec<RowId> {
    let changed: Vec<RowId> = incoming
        .row_versions()
        .iter()
        .filter(|(id, version)| {
            local.version(id) != Some(*version) && local.metadata(id).is_some_and(|meta| !meta.is_stale)
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in &changed {
        local.mark_stale(id);
    }
    changed
}

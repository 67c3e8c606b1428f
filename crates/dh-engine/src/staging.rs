//! Write staging and commit
//!
//! A write is staged under the state lock, sent to the backing store with no
//! lock held, then adopted under the lock again. Nothing in memory changes
//! between staging and a confirmed write.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::persistence::{CommittedRow, RowWrite};
use crate::state::EngineState;
use crate::types::ActionOutcome;
use chrono::{DateTime, Utc};
use dh_model::{fields, AggregateId, Record, RowId, RowStatus, SaveWarning, SectionKey, ValidationStatus};
use dh_store::Section;
use tracing::{debug, warn};

/// Fields only workflow actions and the store may write
const ENGINE_OWNED: &[&str] = &[
    fields::ROW_STATUS,
    fields::REVIEWED_BY,
    fields::REVIEWED_ON,
    fields::APPROVED_BY,
    fields::APPROVED_ON,
    fields::REPORT_INCLUDE,
    fields::ROW_VERSION,
    fields::ACTIVE,
];

#[derive(Debug, Clone)]
pub(crate) struct StagedRow {
    pub(crate) write: RowWrite,
    /// Row revision when staged
    pub(crate) revision: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct StagedWrite {
    pub(crate) section: SectionKey,
    pub(crate) parent: AggregateId,
    pub(crate) epoch: u64,
    pub(crate) rows: Vec<StagedRow>,
    pub(crate) row: Option<RowId>,
    /// Section status once the write lands
    pub(crate) status: RowStatus,
    pub(crate) validation: ValidationStatus,
    pub(crate) warnings: Vec<SaveWarning>,
}

impl StagedWrite {
    pub(crate) fn writes(&self) -> Vec<RowWrite> {
        self.rows.iter().map(|row| row.write.clone()).collect()
    }

    fn revision_of(&self, id: &RowId) -> u64 {
        self.rows
            .iter()
            .find(|row| &row.write.row_id == id)
            .map_or(0, |row| row.revision)
    }
}

/// Stamp the bookkeeping every persisted row carries
pub(crate) fn stamp_for_write(
    record: &mut Record,
    validation: Option<ValidationStatus>,
    parent: &AggregateId,
    config: &EngineConfig,
    at: DateTime<Utc>,
) {
    if let Some(status) = validation {
        record.set_validation_status(status);
    }
    record.stamp_modified(at, &config.user);
    let parent_field = config.parent_id_field.as_str();
    if record.get(parent_field).map_or(true, serde_json::Value::is_null) {
        record.set(parent_field, parent.as_str());
    }
}

/// User edit with the id and engine-owned fields removed
pub(crate) fn user_fields(partial: &Record, id_field: &str) -> Record {
    let mut edit = partial.clone();
    edit.remove(id_field);
    for field in ENGINE_OWNED {
        edit.remove(field);
    }
    edit
}

/// Field edits are only allowed in draft-like statuses
pub(crate) fn ensure_editable(section: &SectionKey, status: RowStatus) -> EngineResult<()> {
    if status.is_editable() {
        Ok(())
    } else {
        Err(EngineError::Locked {
            section: section.clone(),
            status,
        })
    }
}

/// Overall save-tier status of a write
pub(crate) fn overall_validation(warnings: &[SaveWarning]) -> ValidationStatus {
    if warnings.is_empty() {
        ValidationStatus::Valid
    } else {
        ValidationStatus::HasWarnings
    }
}

impl EngineState {
    /// Adopt confirmed rows into the section they were staged from
    pub(crate) fn adopt(&self, staged: StagedWrite, committed: Vec<CommittedRow>) -> ActionOutcome {
        let rows_written = committed.len();
        let mut loaded = self.loaded.write();

        let status = if loaded.epoch == staged.epoch {
            loaded.sections.get_mut(&staged.section).map(|section| {
                match section {
                    Section::Single(store) => {
                        if let Some(row) = committed.into_iter().next() {
                            store.commit(row.record, Some(row.version), staged.revision_of(&row.row_id));
                        }
                    }
                    Section::Collection(store) => {
                        for row in committed {
                            let revision = staged.revision_of(&row.row_id);
                            store.commit_row(&row.row_id, row.record, Some(row.version), revision);
                        }
                    }
                }
                section.status()
            })
        } else {
            None
        };

        let discarded = status.is_none();
        if discarded {
            warn!(section = %staged.section, aggregate = %staged.parent, "aggregate changed while writing; discarding commit");
        } else {
            debug!(section = %staged.section, rows = rows_written, "commit adopted");
        }

        ActionOutcome {
            section: staged.section,
            row: staged.row,
            rows_written,
            status: status.unwrap_or(staged.status),
            validation: staged.validation,
            warnings: staged.warnings,
            discarded,
        }
    }
}

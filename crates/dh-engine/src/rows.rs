//! Row operations on collection sections

use crate::error::{EngineError, EngineResult};
use crate::persistence::RowWrite;
use crate::staging::{ensure_editable, stamp_for_write, user_fields, StagedRow, StagedWrite};
use crate::state::EngineState;
use crate::types::ActionOutcome;
use chrono::Utc;
use dh_model::{fields, Record, RowId, RowStatus, SectionKey, ValidationResult};
use dh_store::{CollectionSectionStore, StoreError};
use tracing::{debug, info, warn};

pub(crate) struct RowExecutor<'a> {
    state: &'a EngineState,
}

impl<'a> RowExecutor<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    pub(crate) fn add_row(&self, key: &SectionKey, row: &Record) -> EngineResult<RowId> {
        let parent_field = self.state.config.parent_id_field.as_str();
        self.state.edit_collection(key, |store, parent, _| {
            ensure_editable(key, store.section_status())?;

            let id_field = store.id_field();
            let mut record = user_fields(row, id_field);
            if let Some(id) = row.get(id_field) {
                record.set(id_field, id.clone());
            }
            if let Some(active) = row.get(fields::ACTIVE) {
                record.set(fields::ACTIVE, active.clone());
            }
            record.set_row_status(RowStatus::Draft);
            if !record.has(parent_field) {
                record.set(parent_field, parent.as_str());
            }

            let id = store.add_row(record)?;
            debug!(section = %key, row = %id, "row added");
            Ok(id)
        })
    }

    pub(crate) fn update_row(&self, key: &SectionKey, id: &RowId, partial: &Record) -> EngineResult<()> {
        self.state.edit_collection(key, |store, _, _| {
            ensure_row_editable(key, store, id)?;
            let edit = user_fields(partial, store.id_field());
            store.update_row(id, &edit)?;
            Ok(())
        })
    }

    pub(crate) fn delete_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<()> {
        self.state.edit_collection(key, |store, _, _| {
            ensure_row_status(key, store, id)?;
            store.delete_row(id)?;
            debug!(section = %key, row = %id, "row deleted");
            Ok(())
        })
    }

    pub(crate) fn restore_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<()> {
        self.state.edit_collection(key, |store, _, _| {
            ensure_row_status(key, store, id)?;
            store.restore_row(id)?;
            debug!(section = %key, row = %id, "row restored");
            Ok(())
        })
    }

    /// Validate and persist one row, leaving the rest of the section alone
    pub(crate) async fn save_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<ActionOutcome> {
        let _in_flight = self.state.guards.acquire(key).await?;

        let Some(staged) = self.stage(key, id)? else {
            let status = self.state.edit_collection(key, |store, _, _| Ok(store.section_status()))?;
            let mut outcome = ActionOutcome::unchanged(key.clone(), status);
            outcome.row = Some(id.clone());
            return Ok(outcome);
        };

        let write = staged
            .writes()
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::row_not_found(key, id))?;
        let committed = match self.state.persistence.update_row(write).await {
            Ok(committed) => committed,
            Err(err) => {
                let err = EngineError::from_persist(key, err);
                warn!(section = %key, row = %id, error = %err, "row write failed");
                return Err(err);
            }
        };

        let outcome = self.state.adopt(staged, vec![committed]);
        info!(section = %key, row = %id, "row written");
        Ok(outcome)
    }

    fn stage(&self, key: &SectionKey, id: &RowId) -> EngineResult<Option<StagedWrite>> {
        let now = Utc::now();
        self.state.edit_collection(key, |store, parent, epoch| {
            let meta = store
                .metadata(id)
                .cloned()
                .ok_or_else(|| StoreError::row_not_found(key, id))?;
            if !meta.is_dirty || (meta.is_new && meta.is_deleted) {
                return Ok(None);
            }

            let result = if meta.is_deleted { None } else { Some(store.validate_row(id)?) };
            if let Some(result) = result.as_ref().filter(|r| !r.can_save()) {
                return Err(EngineError::Validation {
                    section: key.clone(),
                    errors: result.errors().to_vec(),
                });
            }

            let mut record = store.row(id).cloned().ok_or_else(|| StoreError::row_not_found(key, id))?;
            let validation = result.as_ref().map(ValidationResult::status);
            stamp_for_write(&mut record, validation, parent, &self.state.config, now);
            let status = record.row_status();

            Ok(Some(StagedWrite {
                section: key.clone(),
                parent: parent.clone(),
                epoch,
                rows: vec![StagedRow {
                    revision: store.row_revision(id),
                    write: RowWrite {
                        section: key.clone(),
                        parent: parent.clone(),
                        row_id: id.clone(),
                        record,
                        prior: if meta.is_new { None } else { store.original_row(id).cloned() },
                        expected_version: store.version(id).cloned(),
                        deleted: meta.is_deleted,
                    },
                }],
                row: Some(id.clone()),
                status,
                validation: validation.unwrap_or_default(),
                warnings: result.map(|r| r.warnings().to_vec()).unwrap_or_default(),
            }))
        })
    }
}

/// Row exists and its workflow status allows edits
fn ensure_row_status(key: &SectionKey, store: &CollectionSectionStore, id: &RowId) -> EngineResult<()> {
    let row = store.row(id).ok_or_else(|| StoreError::row_not_found(key, id))?;
    ensure_editable(key, row.row_status())
}

/// As [`ensure_row_status`], and the row is not soft-deleted
fn ensure_row_editable(key: &SectionKey, store: &CollectionSectionStore, id: &RowId) -> EngineResult<()> {
    ensure_row_status(key, store, id)?;
    if store.metadata(id).is_some_and(|meta| meta.is_deleted) {
        return Err(EngineError::RowDeleted {
            section: key.clone(),
            row: id.clone(),
        });
    }
    Ok(())
}

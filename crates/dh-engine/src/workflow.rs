//! Section saves and approval workflow
//!
//! Every action runs the same pipeline: claim the section, stage the target
//! state on copies, validate the copies, write, then adopt what the store
//! confirmed. A failure at any step leaves the section untouched.

use crate::error::{EngineError, EngineResult};
use crate::persistence::{RowWrite, UpdateRequest};
use crate::staging::{overall_validation, stamp_for_write, StagedRow, StagedWrite};
use crate::state::EngineState;
use crate::types::ActionOutcome;
use chrono::{DateTime, Utc};
use dh_model::{
    fields, format_timestamp, validate_transition, AggregateId, BlockingError, Record, RowId, RowStatus, SaveWarning,
    SectionKey, ValidationResult, WorkflowAction,
};
use dh_store::{CollectionSectionStore, Section, SectionStore, StoreError};
use serde_json::Value;
use tracing::{debug, info, warn};

/// What a pipeline run does besides saving pending edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    /// Persist pending edits only
    Save,
    /// Move along the approval ladder
    Act(WorkflowAction),
    /// Set report inclusion on an approved section
    Include(bool),
}

impl Intent {
    fn action(self) -> Option<WorkflowAction> {
        match self {
            Self::Save => None,
            Self::Act(action) => Some(action),
            Self::Include(_) => Some(WorkflowAction::ToggleReportInclusion),
        }
    }
}

/// Per-run staging inputs
struct Stage<'a> {
    key: &'a SectionKey,
    parent: &'a AggregateId,
    epoch: u64,
    intent: Intent,
    now: DateTime<Utc>,
}

pub(crate) struct WorkflowExecutor<'a> {
    state: &'a EngineState,
}

impl<'a> WorkflowExecutor<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    pub(crate) async fn run(&self, key: &SectionKey, intent: Intent) -> EngineResult<ActionOutcome> {
        let _in_flight = self.state.guards.acquire(key).await?;

        let Some(staged) = self.stage(key, intent)? else {
            debug!(section = %key, ?intent, "nothing to write");
            let status = self.state.read_section(key, Section::status)?;
            return Ok(ActionOutcome::unchanged(key.clone(), status));
        };

        let request = UpdateRequest {
            section: key.clone(),
            parent: staged.parent.clone(),
            rows: staged.writes(),
        };
        debug!(section = %key, rows = request.rows.len(), "writing section");

        let committed = match self.state.persistence.update(request).await {
            Ok(committed) => committed,
            Err(err) => {
                let err = EngineError::from_persist(key, err);
                warn!(section = %key, ?intent, error = %err, "section write failed");
                return Err(err);
            }
        };

        let outcome = self.state.adopt(staged, committed);
        info!(section = %key, ?intent, status = %outcome.status, rows = outcome.rows_written, "section written");
        Ok(outcome)
    }

    fn stage(&self, key: &SectionKey, intent: Intent) -> EngineResult<Option<StagedWrite>> {
        let now = Utc::now();
        self.state.edit_section(key, |section, parent, epoch| {
            if let Some(action) = intent.action() {
                self.authorize(key, section, action)?;
            }
            let stage = Stage {
                key,
                parent,
                epoch,
                intent,
                now,
            };
            match section {
                Section::Single(store) => self.stage_single(store, &stage),
                Section::Collection(store) => self.stage_collection(store, &stage),
            }
        })
    }

    fn authorize(&self, key: &SectionKey, section: &Section, action: WorkflowAction) -> EngineResult<()> {
        let permissions = self.state.config.permissions;
        let permitted = match action {
            WorkflowAction::Submit => true,
            WorkflowAction::Review | WorkflowAction::Reject => permissions.review,
            WorkflowAction::Approve => permissions.approve,
            WorkflowAction::ToggleReportInclusion => permissions.exclude,
        };
        if !permitted {
            return Err(EngineError::Forbidden {
                section: key.clone(),
                action,
            });
        }

        validate_transition(section.status(), action).map_err(|err| EngineError::transition(key, err))?;

        if action == WorkflowAction::Review && section.is_dirty() {
            return Err(EngineError::UnsavedChanges(key.clone()));
        }
        Ok(())
    }

    fn stage_single(&self, store: &mut SectionStore, stage: &Stage<'_>) -> EngineResult<Option<StagedWrite>> {
        let mut record = store.data().clone();
        let result = match stage.intent {
            Intent::Save => {
                if !store.is_dirty() && !store.is_new() {
                    return Ok(None);
                }
                store.validate().clone()
            }
            Intent::Include(included) if record.report_included() == included && !store.is_dirty() => {
                return Ok(None);
            }
            intent => {
                apply_intent(&mut record, intent, &self.state.config.user, stage.now);
                store.config().validate(&record)
            }
        };
        ensure_can_save(stage.key, &result)?;

        let id_field = store.config().id_field();
        let row_id = record.row_id(id_field).ok_or_else(|| StoreError::MissingRowId {
            section: stage.key.clone(),
            field: id_field,
        })?;
        stamp_for_write(&mut record, Some(result.status()), stage.parent, &self.state.config, stage.now);
        let status = record.row_status();

        let write = RowWrite {
            section: stage.key.clone(),
            parent: stage.parent.clone(),
            row_id,
            record,
            prior: (!store.is_new()).then(|| store.original_data().clone()),
            expected_version: store.version().cloned(),
            deleted: false,
        };
        Ok(Some(StagedWrite {
            section: stage.key.clone(),
            parent: stage.parent.clone(),
            epoch: stage.epoch,
            rows: vec![StagedRow {
                write,
                revision: store.revision(),
            }],
            row: None,
            status,
            validation: result.status(),
            warnings: result.warnings().to_vec(),
        }))
    }

    fn stage_collection(
        &self,
        store: &mut CollectionSectionStore,
        stage: &Stage<'_>,
    ) -> EngineResult<Option<StagedWrite>> {
        let dirty: Vec<RowId> = store.get_dirty_rows().into_iter().map(|(id, _)| id).collect();
        let live: Vec<RowId> = store.live_rows().map(|(id, _)| id).collect();

        let (targets, mut results) = match stage.intent {
            Intent::Save => {
                if dirty.is_empty() {
                    return Ok(None);
                }
                (dirty, store.validate_all())
            }
            intent => {
                if live.is_empty() && dirty.is_empty() {
                    return Ok(None);
                }
                if let Intent::Include(included) = intent {
                    let settled = store.live_rows().all(|(_, row)| row.report_included() == included);
                    if settled && dirty.is_empty() {
                        return Ok(None);
                    }
                }
                let mut targets = live.clone();
                targets.extend(dirty.into_iter().filter(|id| !live.contains(id)));
                (targets, Default::default())
            }
        };

        let mut errors: Vec<BlockingError> = Vec::new();
        let mut warnings: Vec<SaveWarning> = Vec::new();
        let mut staged_rows = Vec::with_capacity(targets.len());

        for id in targets {
            let Some(current) = store.row(&id) else {
                continue;
            };
            let mut record = current.clone();
            let is_live = live.contains(&id);

            if is_live && stage.intent != Intent::Save {
                apply_intent(&mut record, stage.intent, &self.state.config.user, stage.now);
                results.insert(id.clone(), store.config().validate(&record));
            }

            let validation = if is_live { results.get(&id).map(ValidationResult::status) } else { None };
            stamp_for_write(&mut record, validation, stage.parent, &self.state.config, stage.now);

            let meta = store.metadata(&id);
            let is_new = meta.is_some_and(|meta| meta.is_new);
            let deleted = meta.is_some_and(|meta| meta.is_deleted);
            staged_rows.push(StagedRow {
                revision: store.row_revision(&id),
                write: RowWrite {
                    section: stage.key.clone(),
                    parent: stage.parent.clone(),
                    row_id: id.clone(),
                    record,
                    prior: if is_new { None } else { store.original_row(&id).cloned() },
                    expected_version: store.version(&id).cloned(),
                    deleted,
                },
            });
        }

        for result in results.values() {
            errors.extend_from_slice(result.errors());
            warnings.extend_from_slice(result.warnings());
        }
        if !errors.is_empty() {
            return Err(EngineError::Validation {
                section: stage.key.clone(),
                errors,
            });
        }

        let status = match stage.intent.action() {
            Some(action) if !live.is_empty() => action.target(),
            _ => store.section_status(),
        };
        Ok(Some(StagedWrite {
            section: stage.key.clone(),
            parent: stage.parent.clone(),
            epoch: stage.epoch,
            rows: staged_rows,
            row: None,
            status,
            validation: overall_validation(&warnings),
            warnings,
        }))
    }
}

fn ensure_can_save(key: &SectionKey, result: &ValidationResult) -> EngineResult<()> {
    if result.can_save() {
        Ok(())
    } else {
        Err(EngineError::Validation {
            section: key.clone(),
            errors: result.errors().to_vec(),
        })
    }
}

/// Write the field changes an action implies
pub(crate) fn apply_intent(record: &mut Record, intent: Intent, user: &str, now: DateTime<Utc>) {
    let stamp = format_timestamp(now);
    match intent {
        Intent::Save => {}
        Intent::Act(WorkflowAction::Submit) => record.set_row_status(RowStatus::Submitted),
        Intent::Act(WorkflowAction::Review) => {
            record.set_row_status(RowStatus::Reviewed);
            record.set(fields::REVIEWED_BY, user);
            record.set(fields::REVIEWED_ON, stamp);
        }
        Intent::Act(WorkflowAction::Approve) => {
            record.set_row_status(RowStatus::Approved);
            record.set(fields::APPROVED_BY, user);
            record.set(fields::APPROVED_ON, stamp);
            record.set(fields::REPORT_INCLUDE, true);
        }
        Intent::Act(WorkflowAction::Reject) => {
            record.set_row_status(RowStatus::Draft);
            for field in [
                fields::VALIDATION_ERRORS,
                fields::REPORT_INCLUDE,
                fields::REVIEWED_BY,
                fields::REVIEWED_ON,
                fields::APPROVED_BY,
                fields::APPROVED_ON,
            ] {
                record.set(field, Value::Null);
            }
        }
        Intent::Act(WorkflowAction::ToggleReportInclusion) => {
            let included = record.report_included();
            record.set(fields::REPORT_INCLUDE, !included);
        }
        Intent::Include(included) => {
            record.set(fields::REPORT_INCLUDE, included);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn review_stamps_reviewer() {
        let mut record = Record::new().with(fields::ROW_STATUS, 1);
        apply_intent(&mut record, Intent::Act(WorkflowAction::Review), "lead", now());
        assert_eq!(record.row_status(), RowStatus::Reviewed);
        assert_eq!(record.text(fields::REVIEWED_BY), Some("lead"));
        assert_eq!(record.text(fields::REVIEWED_ON), Some("2024-05-02T10:00:00.000Z"));
    }

    #[test]
    fn approve_includes_in_report() {
        let mut record = Record::new().with(fields::ROW_STATUS, 2);
        apply_intent(&mut record, Intent::Act(WorkflowAction::Approve), "chief", now());
        assert_eq!(record.row_status(), RowStatus::Approved);
        assert!(record.report_included());
        assert_eq!(record.text(fields::APPROVED_BY), Some("chief"));
    }

    #[test]
    fn reject_clears_workflow_stamps() {
        let mut record = Record::new()
            .with(fields::ROW_STATUS, 3)
            .with(fields::VALIDATION_ERRORS, "old")
            .with(fields::REPORT_INCLUDE, true)
            .with(fields::APPROVED_BY, "chief");
        apply_intent(&mut record, Intent::Act(WorkflowAction::Reject), "lead", now());

        assert_eq!(record.row_status(), RowStatus::Draft);
        assert_eq!(record.get(fields::VALIDATION_ERRORS), Some(&json!(null)));
        assert_eq!(record.get(fields::APPROVED_BY), Some(&json!(null)));
        assert!(!record.report_included());
    }

    #[test]
    fn toggle_flips_inclusion() {
        let mut record = Record::new().with(fields::REPORT_INCLUDE, true);
        apply_intent(&mut record, Intent::Act(WorkflowAction::ToggleReportInclusion), "chief", now());
        assert!(!record.report_included());
        apply_intent(&mut record, Intent::Include(true), "chief", now());
        assert!(record.report_included());
    }

    #[test]
    fn include_intent_maps_to_toggle_action() {
        assert_eq!(Intent::Include(false).action(), Some(WorkflowAction::ToggleReportInclusion));
        assert_eq!(Intent::Save.action(), None);
    }
}

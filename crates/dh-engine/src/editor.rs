//! Section editor
//!
//! The editor owns the edit state of one loaded aggregate and is the only
//! way callers touch it. All operations take `&self`; share it behind an
//! `Arc` to use it from several tasks.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::loader::AggregateLoader;
use crate::persistence::{AggregateSource, SectionPersistence};
use crate::reconcile;
use crate::rows::RowExecutor;
use crate::staging::{ensure_editable, user_fields};
use crate::state::EngineState;
use crate::types::{ActionOutcome, LoadSummary, ReconcileReport};
use crate::workflow::{Intent, WorkflowExecutor};
use dh_model::{Aggregate, AggregateId, Record, RowId, SectionKey, ValidationResult, WorkflowAction};
use dh_store::{ConfigurationError, Section, SectionRegistry};
use futures::StreamExt;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Edits the sections of one aggregate at a time
#[derive(Debug, Clone)]
pub struct SectionEditor {
    state: Arc<EngineState>,
}

impl SectionEditor {
    /// Create an editor with nothing loaded
    #[must_use]
    pub fn new(
        registry: Arc<SectionRegistry>,
        persistence: Arc<dyn SectionPersistence>,
        source: Arc<dyn AggregateSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            state: Arc::new(EngineState::new(registry, persistence, source, config)),
        }
    }

    /// Section registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SectionRegistry {
        &self.state.registry
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Id of the loaded aggregate
    #[must_use]
    pub fn parent(&self) -> Option<AggregateId> {
        self.state.parent()
    }

    /// Load an aggregate into every section
    ///
    /// # Errors
    /// `AggregateNotFound`, `Fetch`, `Busy` while any save is in flight, or
    /// `Row` when a stored row has no id
    #[instrument(skip_all, fields(aggregate = %parent, force_refresh = force_refresh))]
    pub async fn load_aggregate(&self, parent: &AggregateId, force_refresh: bool) -> EngineResult<LoadSummary> {
        AggregateLoader::new(&self.state).load(parent, force_refresh).await
    }

    /// Reload one section from the store; every other section is untouched
    ///
    /// # Errors
    /// `NotLoaded`, `Busy` while any save is in flight, or a fetch error
    #[instrument(skip_all, fields(section = %key))]
    pub async fn refresh_section(&self, key: &SectionKey) -> EngineResult<()> {
        AggregateLoader::new(&self.state).refresh_section(key).await
    }

    /// Drop all section state
    ///
    /// Writes still in flight complete against the store but are not adopted.
    pub fn unload(&self) {
        self.state.clear();
        info!("aggregate unloaded");
    }

    /// Merge field edits into a form section
    ///
    /// The id field and workflow-owned fields are ignored.
    ///
    /// # Errors
    /// `Configuration` for collection sections, `Locked` outside draft
    pub fn update_section_data(&self, key: &SectionKey, partial: &Record) -> EngineResult<()> {
        self.state.edit_section(key, |section, _, _| {
            let Section::Single(store) = section else {
                return Err(ConfigurationError::NotSingleRecord(key.clone()).into());
            };
            ensure_editable(key, store.row_status())?;

            let id_field = store.config().id_field();
            let mut edit = user_fields(partial, id_field);
            if edit.iter().next().is_none() {
                return Ok(());
            }
            if store.data().row_id(id_field).is_none() {
                edit.set(id_field, Uuid::new_v4().to_string());
            }
            store.update_fields(&edit);
            Ok(())
        })
    }

    /// Validate and persist pending edits
    ///
    /// A clean section succeeds without writing.
    ///
    /// # Errors
    /// `Validation` on blocking errors (nothing written), `Conflict`,
    /// `Persistence`, `Busy`
    #[instrument(skip_all, fields(section = %key))]
    pub async fn save_section(&self, key: &SectionKey) -> EngineResult<ActionOutcome> {
        WorkflowExecutor::new(&self.state).run(key, Intent::Save).await
    }

    /// Draft / Rejected → Submitted
    ///
    /// # Errors
    /// As [`SectionEditor::save_section`], plus `InvalidTransition`
    #[instrument(skip_all, fields(section = %key))]
    pub async fn submit_section(&self, key: &SectionKey) -> EngineResult<ActionOutcome> {
        self.act(key, WorkflowAction::Submit).await
    }

    /// Submitted → Reviewed
    ///
    /// # Errors
    /// `Forbidden` without review permission, `UnsavedChanges` if dirty
    #[instrument(skip_all, fields(section = %key))]
    pub async fn review_section(&self, key: &SectionKey) -> EngineResult<ActionOutcome> {
        self.act(key, WorkflowAction::Review).await
    }

    /// Reviewed → Approved; includes the section in reports
    ///
    /// # Errors
    /// `Forbidden` without approve permission
    #[instrument(skip_all, fields(section = %key))]
    pub async fn approve_section(&self, key: &SectionKey) -> EngineResult<ActionOutcome> {
        self.act(key, WorkflowAction::Approve).await
    }

    /// Submitted / Reviewed / Approved → Draft
    ///
    /// # Errors
    /// `Forbidden` without review permission
    #[instrument(skip_all, fields(section = %key))]
    pub async fn reject_section(&self, key: &SectionKey) -> EngineResult<ActionOutcome> {
        self.act(key, WorkflowAction::Reject).await
    }

    /// Include or exclude an approved section from reports
    ///
    /// # Errors
    /// `Forbidden` without exclude permission, `InvalidTransition` unless approved
    #[instrument(skip_all, fields(section = %key, included = included))]
    pub async fn set_report_inclusion(&self, key: &SectionKey, included: bool) -> EngineResult<ActionOutcome> {
        WorkflowExecutor::new(&self.state).run(key, Intent::Include(included)).await
    }

    async fn act(&self, key: &SectionKey, action: WorkflowAction) -> EngineResult<ActionOutcome> {
        WorkflowExecutor::new(&self.state).run(key, Intent::Act(action)).await
    }

    /// Append a row; an id is generated when the row has none
    ///
    /// # Errors
    /// `Configuration` for single sections, `Locked`, `Row` on duplicate ids
    pub fn add_row(&self, key: &SectionKey, row: &Record) -> EngineResult<RowId> {
        RowExecutor::new(&self.state).add_row(key, row)
    }

    /// Merge field edits into one row
    ///
    /// # Errors
    /// `Configuration` for single sections, `Locked`, `RowDeleted`, `Row`
    pub fn update_row(&self, key: &SectionKey, id: &RowId, partial: &Record) -> EngineResult<()> {
        RowExecutor::new(&self.state).update_row(key, id, partial)
    }

    /// Soft-delete one row
    ///
    /// # Errors
    /// `Configuration` for single sections, `Locked`, `Row`
    pub fn delete_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<()> {
        RowExecutor::new(&self.state).delete_row(key, id)
    }

    /// Undo a soft delete
    ///
    /// # Errors
    /// `Configuration` for single sections, `Locked`, `Row`
    pub fn restore_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<()> {
        RowExecutor::new(&self.state).restore_row(key, id)
    }

    /// Validate and persist one row
    ///
    /// # Errors
    /// `Validation` (nothing written), `Conflict`, `Persistence`, `Busy`
    #[instrument(skip_all, fields(section = %key, row = %id))]
    pub async fn save_row(&self, key: &SectionKey, id: &RowId) -> EngineResult<ActionOutcome> {
        RowExecutor::new(&self.state).save_row(key, id).await
    }

    /// Discard unsaved edits in one section
    ///
    /// # Errors
    /// `Configuration` for unknown sections, `NotLoaded`
    pub fn reset_section(&self, key: &SectionKey) -> EngineResult<()> {
        self.state.edit_section(key, |section, _, _| {
            section.reset();
            debug!(section = %key, "section reset");
            Ok(())
        })
    }

    /// Run both validator tiers without saving
    ///
    /// Collection results are recorded per row and returned combined.
    ///
    /// # Errors
    /// `Configuration` for unknown sections, `NotLoaded`
    pub fn validate_section(&self, key: &SectionKey) -> EngineResult<ValidationResult> {
        self.state.edit_section(key, |section, _, _| {
            Ok(match section {
                Section::Single(store) => store.validate().clone(),
                Section::Collection(store) => {
                    let results = store.validate_all();
                    let errors = results.values().flat_map(|r| r.errors().iter().cloned()).collect();
                    let warnings = results.values().flat_map(|r| r.warnings().iter().cloned()).collect();
                    ValidationResult::from_tiers(errors, warnings)
                }
            })
        })
    }

    /// Whether field edits are allowed on a section, or on one of its rows
    #[must_use]
    pub fn can_edit(&self, key: &SectionKey, row: Option<&RowId>) -> bool {
        if self.state.parent().is_none() {
            return false;
        }
        self.state
            .read_section(key, |section| match (section, row) {
                (_, None) => section.status().is_editable(),
                (Section::Collection(store), Some(id)) => {
                    store.metadata(id).is_some_and(|meta| !meta.is_deleted)
                        && store.row(id).is_some_and(|row| row.row_status().is_editable())
                }
                (Section::Single(_), Some(_)) => false,
            })
            .unwrap_or(false)
    }

    /// Whether any section holds unsaved edits
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.loaded.read().sections.values().any(Section::is_dirty)
    }

    /// Keys of sections holding unsaved edits, in registry order
    #[must_use]
    pub fn get_dirty_sections(&self) -> Vec<SectionKey> {
        self.state
            .loaded
            .read()
            .sections
            .iter()
            .filter(|(_, section)| section.is_dirty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot of one section
    ///
    /// # Errors
    /// `Configuration` for unknown sections
    pub fn section(&self, key: &SectionKey) -> EngineResult<Section> {
        self.state.read_section(key, Clone::clone)
    }

    /// Apply a background change to the loaded aggregate
    pub fn reconcile(&self, aggregate: &Aggregate) -> ReconcileReport {
        reconcile::apply(&self.state, aggregate)
    }

    /// Follow the source's live feed for the loaded aggregate
    ///
    /// Returns `None` when nothing is loaded or the source has no feed. The
    /// task ends when the feed closes or the editor is dropped.
    #[must_use]
    pub fn spawn_live_reconciliation(&self) -> Option<JoinHandle<()>> {
        let parent = self.state.parent()?;
        let mut feed = self.state.source.subscribe(&parent)?;
        let state: Weak<EngineState> = Arc::downgrade(&self.state);

        Some(tokio::spawn(async move {
            while let Some(aggregate) = feed.next().await {
                let Some(state) = state.upgrade() else {
                    break;
                };
                reconcile::apply(&state, &aggregate);
            }
            debug!(aggregate = %parent, "live feed closed");
        }))
    }
}


//! Single-record section store

use dh_model::{Record, RowStatus, RowVersion, ValidationResult};
use dh_model::fields;
use std::sync::Arc;

use crate::registry::SectionConfig;

/// Edit state of a single-record (form) section
///
/// `data` changes only through the methods below; `original_data` changes
/// only on [`SectionStore::load`] and [`SectionStore::commit`].
#[derive(Debug, Clone)]
pub struct SectionStore {
    config: Arc<SectionConfig>,
    data: Record,
    original_data: Record,
    version: Option<RowVersion>,
    is_dirty: bool,
    is_new: bool,
    validation: Option<ValidationResult>,
    revision: u64,
}

impl SectionStore {
    /// Empty store: `data == original_data == config.empty_record()`
    #[must_use]
    pub fn new(config: Arc<SectionConfig>) -> Self {
        let empty = config.empty_record();
        Self {
            config,
            data: empty.clone(),
            original_data: empty,
            version: None,
            is_dirty: false,
            is_new: false,
            validation: None,
            revision: 0,
        }
    }

    /// Section configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Arc<SectionConfig> {
        &self.config
    }

    /// Current (possibly edited) record
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Last committed record
    #[inline]
    #[must_use]
    pub fn original_data(&self) -> &Record {
        &self.original_data
    }

    /// Version token of the committed record
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<&RowVersion> {
        self.version.as_ref()
    }

    /// Unpersisted edits present
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Record has never been persisted
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Last validation outcome
    #[inline]
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    /// Edit counter, bumped by every mutation of `data`
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Workflow status of the current record
    #[inline]
    #[must_use]
    pub fn row_status(&self) -> RowStatus {
        self.data.row_status()
    }

    /// Merge field edits
    pub fn update_fields(&mut self, partial: &Record) {
        self.data.merge(partial);
        self.touch();
    }

    /// Run both validator tiers against `data`
    pub fn validate(&mut self) -> &ValidationResult {
        let result = self.config.validate(&self.data);
        self.validation.insert(result)
    }

    /// Whether the last validation allowed saving; unvalidated reads as false
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation.as_ref().is_some_and(ValidationResult::can_save)
    }

    /// Discard edits
    ///
    /// A record synthesized locally and never persisted stays new.
    pub fn reset(&mut self) {
        if self.data != self.original_data {
            self.revision += 1;
        }
        self.data = self.original_data.clone();
        self.is_dirty = false;
        self.validation = None;
    }

    /// Replace with freshly read state
    pub fn load(&mut self, record: Record) {
        self.version = record.version();
        self.data = record.clone();
        self.original_data = record;
        self.is_dirty = false;
        self.is_new = false;
        self.validation = None;
        self.revision += 1;
    }

    /// Install a locally synthesized record that has no backing row yet
    pub fn adopt_unsaved(&mut self, record: Record) {
        self.data = record;
        self.version = None;
        self.is_new = true;
        self.touch();
    }

    /// Adopt a persisted record
    ///
    /// `edited_since` is the revision observed when the write was staged. If
    /// the record was edited while the write was in flight, the committed
    /// record becomes the baseline and the newer edits stay dirty.
    pub fn commit(&mut self, record: Record, version: Option<RowVersion>, edited_since: u64) {
        self.version = version.or_else(|| record.version());
        self.is_new = false;
        if self.revision == edited_since {
            self.data = record.clone();
            self.is_dirty = false;
        } else {
            self.is_dirty = !self.data.same_content(&record, fields::BOOKKEEPING);
        }
        self.original_data = record;
        self.revision += 1;
    }

    fn touch(&mut self) {
        self.is_dirty = true;
        self.validation = None;
        self.revision += 1;
    }
}

//! Outcome types returned by engine operations

use dh_model::{RowId, RowStatus, SaveWarning, SectionKey, ValidationStatus};

/// Result of a save, row save or workflow action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// Section acted on
    pub section: SectionKey,
    /// Row acted on, for row-scoped saves
    pub row: Option<RowId>,
    /// Rows sent to the backing store; zero for a no-op
    pub rows_written: usize,
    /// Section status after the operation
    pub status: RowStatus,
    /// Save-tier outcome stamped on the written rows
    pub validation: ValidationStatus,
    /// Non-blocking warnings from the save tier
    pub warnings: Vec<SaveWarning>,
    /// Write confirmed but not adopted because the aggregate was unloaded meanwhile
    pub discarded: bool,
}

impl ActionOutcome {
    /// Nothing needed writing
    #[must_use]
    pub fn unchanged(section: SectionKey, status: RowStatus) -> Self {
        Self {
            section,
            row: None,
            rows_written: 0,
            status,
            validation: ValidationStatus::NotValidated,
            warnings: Vec::new(),
            discarded: false,
        }
    }

    /// Whether anything was written
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.rows_written == 0
    }
}

/// Result of an aggregate load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Sections whose state was replaced
    pub replaced: Vec<SectionKey>,
    /// Sections kept because nothing changed
    pub unchanged: Vec<SectionKey>,
    /// Required single sections synthesized as new records
    pub synthesized: Vec<SectionKey>,
}

/// Result of applying a background change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Clean sections that took the incoming state
    pub adopted: Vec<SectionKey>,
    /// Dirty sections whose edits the incoming state already holds
    pub confirmed: Vec<SectionKey>,
    /// Dirty sections whose edits were kept
    pub kept: Vec<SectionKey>,
    /// Sections skipped because an operation was in flight
    pub skipped: Vec<SectionKey>,
    /// Rows newly flagged stale
    pub stale_rows: Vec<(SectionKey, RowId)>,
}

impl ReconcileReport {
    /// Whether the change touched nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adopted.is_empty() && self.confirmed.is_empty() && self.kept.is_empty() && self.stale_rows.is_empty()
    }
}

//! Per-row bookkeeping for collection sections

use crate::ids::{RowId, RowVersion};
use crate::status::{RowStatus, ValidationStatus};
use crate::validation::{BlockingError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Version token per row, captured at load time
pub type RowVersionMap = HashMap<RowId, RowVersion>;

/// Edit state of one row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowMetadata {
    /// Unpersisted local edits
    pub is_dirty: bool,
    /// Added locally, never persisted
    pub is_new: bool,
    /// Soft-deleted; the row stays in the section's data
    pub is_deleted: bool,
    /// A newer version exists in the backing store
    pub is_stale: bool,
    /// Outcome of the last validation run
    pub validation_status: ValidationStatus,
    /// Blocking errors from the last validation run
    pub validation_errors: Vec<BlockingError>,
    /// Mirror of the row's workflow status
    pub row_status: RowStatus,
}

impl RowMetadata {
    /// Metadata for a row read from the store
    #[inline]
    #[must_use]
    pub fn loaded(row_status: RowStatus) -> Self {
        Self {
            row_status,
            ..Self::default()
        }
    }

    /// Metadata for a row added locally
    #[inline]
    #[must_use]
    pub fn added(row_status: RowStatus) -> Self {
        Self {
            is_dirty: true,
            is_new: true,
            row_status,
            ..Self::default()
        }
    }

    /// Mark edited; any earlier validation no longer applies
    pub fn touch(&mut self) {
        self.is_dirty = true;
        self.validation_status = ValidationStatus::NotValidated;
        self.validation_errors.clear();
    }

    /// Record a validation outcome
    pub fn apply_validation(&mut self, result: &ValidationResult) {
        self.validation_status = result.status();
        self.validation_errors = result.errors().to_vec();
    }

    /// Mark persisted
    pub fn committed(&mut self, row_status: RowStatus) {
        self.is_dirty = false;
        self.is_new = false;
        self.is_stale = false;
        self.row_status = row_status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_resets_validation() {
        let mut meta = RowMetadata::loaded(RowStatus::Draft);
        meta.apply_validation(&ValidationResult::valid());
        assert_eq!(meta.validation_status, ValidationStatus::Valid);

        meta.touch();
        assert!(meta.is_dirty);
        assert_eq!(meta.validation_status, ValidationStatus::NotValidated);
    }

    #[test]
    fn commit_clears_flags() {
        let mut meta = RowMetadata::added(RowStatus::Draft);
        meta.is_stale = true;
        meta.committed(RowStatus::Submitted);
        assert!(!meta.is_dirty);
        assert!(!meta.is_new);
        assert!(!meta.is_stale);
        assert_eq!(meta.row_status, RowStatus::Submitted);
    }
}

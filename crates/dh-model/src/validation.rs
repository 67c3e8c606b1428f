//! Two-tier validation results
//!
//! The database tier blocks persistence; the save tier only warns. A
//! [`ValidationResult`] can only be built from both tiers, so `can_save` is
//! always derived from the database tier alone.

use crate::status::ValidationStatus;
use serde::{Deserialize, Serialize};

/// Issue that prevents a record from being persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingError {
    /// Offending field
    pub field: String,
    /// Human-readable explanation
    pub message: String,
    /// Stable machine code
    pub code: String,
}

impl BlockingError {
    /// Create new blocking error
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Issue reported alongside a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveWarning {
    /// Offending field
    pub field: String,
    /// Human-readable explanation
    pub message: String,
    /// Stable machine code
    pub code: String,
}

impl SaveWarning {
    /// Create new warning
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Blocking tier outcome
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseTier {
    /// No blocking errors
    pub is_valid: bool,
    /// Itemized blocking errors
    pub errors: Vec<BlockingError>,
}

/// Warning tier outcome
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveTier {
    /// No warnings
    pub is_valid: bool,
    /// Itemized warnings
    pub warnings: Vec<SaveWarning>,
}

/// Combined outcome of both validation tiers
///
/// Deserialization rebuilds the result from its tiers, so `can_save` always
/// follows the blocking tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TierPair")]
pub struct ValidationResult {
    database: DatabaseTier,
    save: SaveTier,
    can_save: bool,
}

impl ValidationResult {
    /// Build from the output of both validator tiers
    #[must_use]
    pub fn from_tiers(errors: Vec<BlockingError>, warnings: Vec<SaveWarning>) -> Self {
        let can_save = errors.is_empty();
        Self {
            database: DatabaseTier {
                is_valid: can_save,
                errors,
            },
            save: SaveTier {
                is_valid: warnings.is_empty(),
                warnings,
            },
            can_save,
        }
    }

    /// Result with no issues
    #[inline]
    #[must_use]
    pub fn valid() -> Self {
        Self::from_tiers(Vec::new(), Vec::new())
    }

    /// Blocking tier
    #[inline]
    #[must_use]
    pub fn database(&self) -> &DatabaseTier {
        &self.database
    }

    /// Warning tier
    #[inline]
    #[must_use]
    pub fn save(&self) -> &SaveTier {
        &self.save
    }

    /// Whether persistence may proceed
    #[inline]
    #[must_use]
    pub fn can_save(&self) -> bool {
        self.can_save
    }

    /// Blocking errors
    #[inline]
    #[must_use]
    pub fn errors(&self) -> &[BlockingError] {
        &self.database.errors
    }

    /// Warnings
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[SaveWarning] {
        &self.save.warnings
    }

    /// Status code stamped on the persisted record
    #[must_use]
    pub fn status(&self) -> ValidationStatus {
        if !self.can_save {
            ValidationStatus::HasErrors
        } else if self.save.is_valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::HasWarnings
        }
    }
}

#[derive(Deserialize)]
struct TierPair {
    database: DatabaseTier,
    save: SaveTier,
}

impl From<TierPair> for ValidationResult {
    fn from(pair: TierPair) -> Self {
        Self::from_tiers(pair.database.errors, pair.save.warnings)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

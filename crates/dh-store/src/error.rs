//! Error types for section configuration and store operations

use dh_model::{RowId, SectionKey};

/// Section configuration is missing or inconsistent
///
/// Raised instead of falling back to a default; a misconfigured section is a
/// programming error that must surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// No registry entry for the key
    #[error("no section registered under '{0}'")]
    UnknownSection(SectionKey),

    /// Row operations need an id field, which only collections carry
    #[error("section '{0}' has no row id field; row operations need a collection section")]
    NoRowIdField(SectionKey),

    /// Form-level edit aimed at a grid section
    #[error("section '{0}' is a collection; edit its rows instead")]
    NotSingleRecord(SectionKey),

    /// Registry entry built without validators
    #[error("section '{0}' has no validators")]
    MissingValidators(SectionKey),

    /// Registry entry built without an empty-record factory
    #[error("section '{0}' has no empty-record factory")]
    MissingEmptyFactory(SectionKey),

    /// Id field configured as an empty string
    #[error("section '{0}' has an empty id field name")]
    EmptyIdField(SectionKey),

    /// Two entries under one key
    #[error("section '{0}' registered twice")]
    DuplicateSection(SectionKey),
}

/// Row-level store operation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No row with that id in the section
    #[error("row '{row}' not found in section '{section}'")]
    RowNotFound {
        /// Section searched
        section: SectionKey,
        /// Missing row
        row: RowId,
    },

    /// Row id already present
    #[error("row '{row}' already exists in section '{section}'")]
    DuplicateRow {
        /// Target section
        section: SectionKey,
        /// Clashing row
        row: RowId,
    },

    /// Stored row lacks a usable value in the id field
    #[error("row in section '{section}' has no value in id field '{field}'")]
    MissingRowId {
        /// Target section
        section: SectionKey,
        /// Configured id field
        field: &'static str,
    },
}

impl StoreError {
    /// Create row-not-found error
    pub fn row_not_found(section: &SectionKey, row: &RowId) -> Self {
        Self::RowNotFound {
            section: section.clone(),
            row: row.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_display() {
        let err = ConfigurationError::NoRowIdField(SectionKey::new("collar"));
        assert!(err.to_string().contains("collar"));
        assert!(err.to_string().contains("collection"));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::row_not_found(&SectionKey::new("survey"), &RowId::new("S9"));
        assert_eq!(err.to_string(), "row 'S9' not found in section 'survey'");
    }
}

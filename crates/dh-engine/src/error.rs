//! Error types for engine operations

use crate::persistence::PersistError;
use dh_model::{AggregateId, BlockingError, RowId, RowStatus, RowVersion, SectionKey, TransitionError, WorkflowAction};
use dh_store::{ConfigurationError, StoreError};

/// Result alias for every public engine operation
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of an engine operation
///
/// Every variant leaves in-memory section state exactly as it was before the
/// operation started.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Database-tier validation failed; nothing was written
    #[error("section '{section}' has {} blocking validation error(s)", errors.len())]
    Validation {
        /// Section that failed
        section: SectionKey,
        /// Blocking errors, in validator order
        errors: Vec<BlockingError>,
    },

    /// Another writer changed a row since it was loaded
    #[error("row '{row}' in section '{section}' was changed elsewhere (expected version {expected:?}, found {actual:?})")]
    Conflict {
        /// Section being written
        section: SectionKey,
        /// Row whose version no longer matched
        row: RowId,
        /// Version captured at load
        expected: Option<RowVersion>,
        /// Version currently stored
        actual: Option<RowVersion>,
    },

    /// Backing store rejected or failed the write
    #[error("could not persist section '{section}': {message}")]
    Persistence {
        /// Section being written
        section: SectionKey,
        /// Store-provided detail
        message: String,
    },

    /// Aggregate fetch failed
    #[error("could not fetch aggregate '{aggregate}': {message}")]
    Fetch {
        /// Requested aggregate
        aggregate: AggregateId,
        /// Store-provided detail
        message: String,
    },

    /// Section missing from, or misused against, the registry
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Row-level store failure
    #[error(transparent)]
    Row(#[from] StoreError),

    /// Operation needs a loaded aggregate
    #[error("no aggregate loaded")]
    NotLoaded,

    /// Source has no aggregate under that id
    #[error("aggregate '{0}' not found")]
    AggregateNotFound(AggregateId),

    /// Field edits attempted outside Draft / Rejected
    #[error("section '{section}' is read-only while {status}")]
    Locked {
        /// Target section
        section: SectionKey,
        /// Status that forbids editing
        status: RowStatus,
    },

    /// Edit aimed at a soft-deleted row
    #[error("row '{row}' in section '{section}' is deleted; restore it first")]
    RowDeleted {
        /// Target section
        section: SectionKey,
        /// Deleted row
        row: RowId,
    },

    /// Acting user lacks the permission the action needs
    #[error("not permitted to {action} section '{section}'")]
    Forbidden {
        /// Target section
        section: SectionKey,
        /// Refused action
        action: WorkflowAction,
    },

    /// Workflow action not allowed from the current status
    #[error("section '{section}': {source}")]
    InvalidTransition {
        /// Target section
        section: SectionKey,
        /// Rejected transition
        #[source]
        source: TransitionError,
    },

    /// Action requires a clean section
    #[error("section '{0}' has unsaved changes")]
    UnsavedChanges(SectionKey),

    /// Another operation on the section is still in flight
    #[error("section '{0}' has an operation in flight")]
    Busy(SectionKey),
}

impl EngineError {
    /// Map a persistence failure for a section
    #[must_use]
    pub fn from_persist(section: &SectionKey, err: PersistError) -> Self {
        match err {
            PersistError::Conflict { row, expected, actual } => Self::Conflict {
                section: section.clone(),
                row,
                expected,
                actual,
            },
            PersistError::Io(message) => Self::Persistence {
                section: section.clone(),
                message,
            },
        }
    }

    /// Create invalid-transition error
    #[must_use]
    pub fn transition(section: &SectionKey, source: TransitionError) -> Self {
        Self::InvalidTransition {
            section: section.clone(),
            source,
        }
    }

    /// Check if retrying the same call later may succeed
    ///
    /// Conflicts are not retryable: the caller must reload first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Fetch { .. } | Self::Busy(_))
    }

    /// Check if this is an optimistic-concurrency conflict
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Blocking validation errors, empty for other variants
    #[must_use]
    pub fn blocking_errors(&self) -> &[BlockingError] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

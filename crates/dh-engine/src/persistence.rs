//! Seams to the backing store
//!
//! The engine never talks to storage directly. Writes go through
//! [`SectionPersistence`], reads through [`AggregateSource`]; both are
//! injected into the editor as trait objects.

use async_trait::async_trait;
use dh_model::{Aggregate, AggregateId, Record, RowId, RowVersion, SectionKey};
use futures::stream::BoxStream;
use std::fmt::Debug;

/// One row to write
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    /// Target section
    pub section: SectionKey,
    /// Owning aggregate
    pub parent: AggregateId,
    /// Row identity
    pub row_id: RowId,
    /// Full record to store
    pub record: Record,
    /// Last committed state; `None` for rows never persisted
    pub prior: Option<Record>,
    /// Version the row had when loaded; `None` for rows never persisted
    pub expected_version: Option<RowVersion>,
    /// Row is soft-deleted; the store must keep the deletion even when the
    /// record carries no active flag of its own
    pub deleted: bool,
}

/// Section-wide write; applied atomically
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Target section
    pub section: SectionKey,
    /// Owning aggregate
    pub parent: AggregateId,
    /// Rows to write, in section order
    pub rows: Vec<RowWrite>,
}

/// Row as confirmed by the store
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRow {
    /// Row identity
    pub row_id: RowId,
    /// Stored record, including any server-assigned fields
    pub record: Record,
    /// New version token
    pub version: RowVersion,
}

/// Store-side failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// Expected version did not match the stored one
    #[error("version conflict on row '{row}': expected {expected:?}, found {actual:?}")]
    Conflict {
        /// Conflicting row
        row: RowId,
        /// Version the writer expected
        expected: Option<RowVersion>,
        /// Version actually stored
        actual: Option<RowVersion>,
    },

    /// Transport or storage failure
    #[error("storage failure: {0}")]
    Io(String),
}

/// Writes section data
#[async_trait]
pub trait SectionPersistence: Send + Sync + Debug {
    /// Write every row of the request, or none
    ///
    /// # Errors
    /// `PersistError::Conflict` when any row's expected version is stale
    async fn update(&self, request: UpdateRequest) -> Result<Vec<CommittedRow>, PersistError>;

    /// Write one row
    ///
    /// # Errors
    /// `PersistError::Conflict` when the expected version is stale
    async fn update_row(&self, write: RowWrite) -> Result<CommittedRow, PersistError>;
}

/// Reads aggregates
#[async_trait]
pub trait AggregateSource: Send + Sync + Debug {
    /// Fetch an aggregate; `force_refresh` bypasses any local cache
    ///
    /// # Errors
    /// `PersistError::Io` when the fetch fails
    async fn load_aggregate(&self, id: &AggregateId, force_refresh: bool) -> Result<Option<Aggregate>, PersistError>;

    /// Live feed of background changes to an aggregate, if the source has one
    fn subscribe(&self, _id: &AggregateId) -> Option<BoxStream<'static, Aggregate>> {
        None
    }
}

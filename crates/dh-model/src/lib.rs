//! Drill-hole section model
//!
//! Plain data shared by the store and engine crates:
//!
//! - [`Record`]: one physical row as a field map
//! - [`RowStatus`] and the approval state machine in [`status`]
//! - [`ValidationResult`]: the two-tier (blocking / warning) contract
//! - [`RowMetadata`] and [`RowVersionMap`]: per-row edit state
//! - [`Aggregate`]: everything stored for one parent

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod aggregate;
pub mod ids;
pub mod metadata;
pub mod record;
pub mod status;
pub mod validation;

pub use aggregate::Aggregate;
pub use ids::{AggregateId, RowId, RowVersion, SectionKey};
pub use metadata::{RowMetadata, RowVersionMap};
pub use record::{fields, format_timestamp, Record};
pub use status::{allowed_actions, validate_transition, RowStatus, TransitionError, ValidationStatus, WorkflowAction};
pub use validation::{BlockingError, DatabaseTier, SaveTier, SaveWarning, ValidationResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

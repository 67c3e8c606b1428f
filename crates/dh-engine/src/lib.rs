//! Drill-hole section editing engine
//!
//! Edits the sections of one drill-hole aggregate offline-first:
//! - Loads an aggregate into typed section stores
//! - Tracks row and field edits with dirty and soft-delete state
//! - Gates every write on blocking validation, reporting warnings
//! - Drives the Draft → Submitted → Reviewed → Approved workflow
//! - Writes with optimistic concurrency and reconciles background changes
//!
//! # Example
//!
//! ```rust,ignore
//! use dh_engine::{EngineConfig, SectionEditor};
//! use dh_model::{AggregateId, Record, SectionKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let editor = SectionEditor::new(registry, backend.clone(), backend, EngineConfig::new("geo1"));
//! editor.load_aggregate(&AggregateId::new("DH-001"), false).await?;
//!
//! let collar = SectionKey::new("collar");
//! editor.update_section_data(&collar, &Record::new().with("HoleId", "DH-001"))?;
//! let outcome = editor.submit_section(&collar).await?;
//! println!("{} warning(s)", outcome.warnings.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Public modules
pub mod config;
pub mod error;
pub mod loader;
pub mod persistence;
pub mod telemetry;
pub mod types;

// Internals
mod editor;
mod guard;
mod reconcile;
mod rows;
mod staging;
mod state;
mod workflow;

// Re-exports for convenience
pub use config::{ConfigError, EngineConfig, InFlightPolicy, Permissions, DEFAULT_PARENT_ID_FIELD};
pub use editor::SectionEditor;
pub use error::{EngineError, EngineResult};
pub use loader::{ensure_default, single_record};
pub use persistence::{AggregateSource, CommittedRow, PersistError, RowWrite, SectionPersistence, UpdateRequest};
pub use types::{ActionOutcome, LoadSummary, ReconcileReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the editor
    pub use crate::{
        ActionOutcome, AggregateSource, EngineConfig, EngineError, EngineResult, InFlightPolicy, Permissions,
        SectionEditor, SectionPersistence,
    };
    pub use dh_model::{AggregateId, Record, RowId, RowStatus, SectionKey};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

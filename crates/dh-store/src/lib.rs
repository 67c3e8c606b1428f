//! Section stores
//!
//! Holds the edit state of one aggregate's sections.
//!
//! # Core Concepts
//!
//! - [`SectionRegistry`]: immutable per-section configuration (kind, id field,
//!   validators, empty-record factory)
//! - [`SectionStore`]: single-record form state
//! - [`CollectionSectionStore`]: ordered rows with per-row metadata and
//!   version tokens
//! - [`SectionFactory`]: builds empty stores from the registry
//!
//! # Example
//!
//! ```rust,ignore
//! use dh_store::{SectionConfig, SectionFactory, SectionKind, SectionRegistry};
//!
//! let registry = SectionRegistry::builder()
//!     .register(
//!         SectionConfig::builder("survey", SectionKind::Collection { id_field: "SurveyId", order_by: Some("Depth") })
//!             .validators(survey_validators)
//!             .empty_record(Record::new)
//!             .build()?,
//!     )?
//!     .build();
//!
//! let sections = SectionFactory::build_all(&registry);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod collection;
mod error;
mod registry;
mod section;
mod single;

pub use collection::{sort_rows, CollectionSectionStore};
pub use error::{ConfigurationError, StoreError};
pub use registry::{
    FnValidator, SectionConfig, SectionConfigBuilder, SectionKind, SectionRegistry,
    SectionRegistryBuilder, SectionValidator,
};
pub use section::{Section, SectionFactory};
pub use single::SectionStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

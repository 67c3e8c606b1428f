//! Section stores behind one type, and the factory that builds them

use crate::collection::CollectionSectionStore;
use crate::registry::{SectionConfig, SectionRegistry};
use crate::single::SectionStore;
use dh_model::{RowStatus, SectionKey};
use indexmap::IndexMap;
use std::sync::Arc;

/// Store of either shape
#[derive(Debug, Clone)]
pub enum Section {
    /// Form section
    Single(SectionStore),
    /// Grid section
    Collection(CollectionSectionStore),
}

impl Section {
    /// Section configuration
    #[must_use]
    pub fn config(&self) -> &Arc<SectionConfig> {
        match self {
            Self::Single(store) => store.config(),
            Self::Collection(store) => store.config(),
        }
    }

    /// Section key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &SectionKey {
        self.config().key()
    }

    /// Unpersisted edits present
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Single(store) => store.is_dirty(),
            Self::Collection(store) => store.is_dirty(),
        }
    }

    /// Workflow status governing section-level edits
    #[must_use]
    pub fn status(&self) -> RowStatus {
        match self {
            Self::Single(store) => store.row_status(),
            Self::Collection(store) => store.section_status(),
        }
    }

    /// Discard edits
    pub fn reset(&mut self) {
        match self {
            Self::Single(store) => store.reset(),
            Self::Collection(store) => store.reset(),
        }
    }

    /// Form store, if this is one
    #[must_use]
    pub fn as_single(&self) -> Option<&SectionStore> {
        match self {
            Self::Single(store) => Some(store),
            Self::Collection(_) => None,
        }
    }

    /// Grid store, if this is one
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionSectionStore> {
        match self {
            Self::Collection(store) => Some(store),
            Self::Single(_) => None,
        }
    }
}

/// Builds empty stores from registry entries
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionFactory;

impl SectionFactory {
    /// Empty store for one section
    #[must_use]
    pub fn build(config: &Arc<SectionConfig>) -> Section {
        if config.kind().is_collection() {
            Section::Collection(CollectionSectionStore::new(Arc::clone(config)))
        } else {
            Section::Single(SectionStore::new(Arc::clone(config)))
        }
    }

    /// Empty stores for every registered section, in registration order
    #[must_use]
    pub fn build_all(registry: &SectionRegistry) -> IndexMap<SectionKey, Section> {
        registry
            .iter()
            .map(|config| (config.key().clone(), Self::build(config)))
            .collect()
    }
}

//! Shared engine state
//!
//! Section stores live behind one `parking_lot::RwLock`. Every access is a
//! short synchronous critical section; the lock is never held across an
//! `.await`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::guard::InFlightGuards;
use crate::persistence::{AggregateSource, SectionPersistence};
use dh_model::{AggregateId, SectionKey};
use dh_store::{CollectionSectionStore, ConfigurationError, Section, SectionFactory, SectionRegistry};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Sections of the currently loaded aggregate
#[derive(Debug)]
pub(crate) struct Loaded {
    pub(crate) parent: Option<AggregateId>,
    pub(crate) sections: IndexMap<SectionKey, Section>,
    /// Bumped by every load and unload; commits staged under an older epoch are dropped
    pub(crate) epoch: u64,
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) registry: Arc<SectionRegistry>,
    pub(crate) config: EngineConfig,
    pub(crate) persistence: Arc<dyn SectionPersistence>,
    pub(crate) source: Arc<dyn AggregateSource>,
    pub(crate) loaded: RwLock<Loaded>,
    pub(crate) guards: InFlightGuards,
}

impl EngineState {
    pub(crate) fn new(
        registry: Arc<SectionRegistry>,
        persistence: Arc<dyn SectionPersistence>,
        source: Arc<dyn AggregateSource>,
        config: EngineConfig,
    ) -> Self {
        let sections = SectionFactory::build_all(&registry);
        Self {
            guards: InFlightGuards::new(config.in_flight),
            registry,
            config,
            persistence,
            source,
            loaded: RwLock::new(Loaded {
                parent: None,
                sections,
                epoch: 0,
            }),
        }
    }

    pub(crate) fn parent(&self) -> Option<AggregateId> {
        self.loaded.read().parent.clone()
    }

    /// Read one section
    pub(crate) fn read_section<R>(&self, key: &SectionKey, f: impl FnOnce(&Section) -> R) -> EngineResult<R> {
        self.registry.get(key)?;
        let loaded = self.loaded.read();
        loaded
            .sections
            .get(key)
            .map(f)
            .ok_or_else(|| ConfigurationError::UnknownSection(key.clone()).into())
    }

    /// Mutate one section of the loaded aggregate
    ///
    /// The closure sees the section, the loaded aggregate id and the current
    /// epoch.
    pub(crate) fn edit_section<R>(
        &self,
        key: &SectionKey,
        f: impl FnOnce(&mut Section, &AggregateId, u64) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.registry.get(key)?;
        let mut loaded = self.loaded.write();
        let Loaded { parent, sections, epoch } = &mut *loaded;
        let parent = parent.as_ref().ok_or(EngineError::NotLoaded)?;
        let section = sections
            .get_mut(key)
            .ok_or_else(|| ConfigurationError::UnknownSection(key.clone()))?;
        f(section, parent, *epoch)
    }

    /// Mutate one collection section; single sections are a configuration error
    pub(crate) fn edit_collection<R>(
        &self,
        key: &SectionKey,
        f: impl FnOnce(&mut CollectionSectionStore, &AggregateId, u64) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.registry.row_id_field(key)?;
        self.edit_section(key, |section, parent, epoch| match section {
            Section::Collection(store) => f(store, parent, epoch),
            Section::Single(_) => Err(ConfigurationError::NoRowIdField(key.clone()).into()),
        })
    }

    /// Drop all section state
    pub(crate) fn clear(&self) {
        let mut loaded = self.loaded.write();
        loaded.parent = None;
        loaded.sections = SectionFactory::build_all(&self.registry);
        loaded.epoch += 1;
    }
}

//! Aggregate loading
//!
//! Sections are mapped from a fetched [`Aggregate`] with no lock held and
//! swapped in under one write.

use crate::error::{EngineError, EngineResult};
use crate::state::EngineState;
use crate::types::LoadSummary;
use dh_model::{Aggregate, AggregateId, Record, RowStatus, SectionKey};
use dh_store::{sort_rows, ConfigurationError, Section, SectionConfig, SectionFactory, SectionRegistry, SectionStore};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A section freshly built from an aggregate
#[derive(Debug)]
pub(crate) struct Mapped {
    pub(crate) section: Section,
    pub(crate) synthesized: bool,
}

/// First live record of a single section, if the aggregate has one
#[must_use]
pub fn single_record(aggregate: &Aggregate, config: &SectionConfig) -> Option<Record> {
    aggregate
        .records(config.key())
        .iter()
        .find(|record| record.is_active())
        .cloned()
}

/// Synthesize the record of a required single section
///
/// Builds the section's empty record, links it to `parent`, gives it a fresh
/// row id and installs it as new and dirty. Sections not marked required are
/// left alone. Returns whether a record was installed.
pub fn ensure_default(store: &mut SectionStore, parent: &AggregateId, parent_id_field: &str) -> bool {
    let config = Arc::clone(store.config());
    if !config.is_required() {
        return false;
    }

    let mut record = config.empty_record();
    record.set(parent_id_field, parent.as_str());
    record.set(config.id_field(), Uuid::new_v4().to_string());
    if !record.has(dh_model::fields::ROW_STATUS) {
        record.set_row_status(RowStatus::Draft);
    }
    store.adopt_unsaved(record);
    true
}

/// Build every registered section from an aggregate
pub(crate) fn map_sections(
    registry: &SectionRegistry,
    aggregate: &Aggregate,
    parent_id_field: &str,
) -> EngineResult<IndexMap<SectionKey, Mapped>> {
    let mut mapped = IndexMap::with_capacity(registry.len());
    for config in registry.iter() {
        let mut section = SectionFactory::build(config);
        let mut synthesized = false;
        match &mut section {
            Section::Collection(store) => {
                let mut rows = aggregate.records(config.key()).to_vec();
                sort_rows(config.kind(), &mut rows);
                store.load(rows)?;
            }
            Section::Single(store) => match single_record(aggregate, config) {
                Some(record) => store.load(record),
                None => synthesized = ensure_default(store, &aggregate.id, parent_id_field),
            },
        }
        mapped.insert(config.key().clone(), Mapped { section, synthesized });
    }
    Ok(mapped)
}

/// Whether two stores hold the same loaded state
pub(crate) fn same_state(current: &Section, fresh: &Section) -> bool {
    match (current, fresh) {
        (Section::Single(a), Section::Single(b)) => {
            a.data() == b.data()
                && a.original_data() == b.original_data()
                && a.version() == b.version()
                && a.is_new() == b.is_new()
        }
        (Section::Collection(a), Section::Collection(b)) => {
            a.data() == b.data()
                && a.original_data() == b.original_data()
                && a.row_versions() == b.row_versions()
                && a.live_rows().map(|(id, _)| id).eq(b.live_rows().map(|(id, _)| id))
        }
        _ => false,
    }
}

/// A synthesized record that has not been persisted yet
fn still_unsaved(current: &Section) -> bool {
    current.as_single().is_some_and(SectionStore::is_new)
}

pub(crate) struct AggregateLoader<'a> {
    state: &'a EngineState,
}

impl<'a> AggregateLoader<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Load every section of an aggregate
    ///
    /// A section that is clean and whose fresh state equals its current
    /// state is kept as it is. So is a synthesized record not yet saved when
    /// the store still has none.
    pub(crate) async fn load(&self, parent: &AggregateId, force_refresh: bool) -> EngineResult<LoadSummary> {
        self.ensure_idle()?;
        let aggregate = self.fetch(parent, force_refresh).await?;
        let fresh = map_sections(&self.state.registry, &aggregate, &self.state.config.parent_id_field)?;

        let mut summary = LoadSummary::default();
        let mut loaded = self.state.loaded.write();
        self.ensure_idle()?;

        let same_parent = loaded.parent.as_ref() == Some(parent);
        for (key, mapped) in fresh {
            let keep = same_parent
                && loaded.sections.get(&key).is_some_and(|current| {
                    (!current.is_dirty() && same_state(current, &mapped.section))
                        || (mapped.synthesized && still_unsaved(current))
                });
            if keep {
                summary.unchanged.push(key);
                continue;
            }
            if mapped.synthesized {
                summary.synthesized.push(key.clone());
            }
            summary.replaced.push(key.clone());
            loaded.sections.insert(key, mapped.section);
        }
        loaded.parent = Some(parent.clone());
        loaded.epoch += 1;

        info!(
            aggregate = %parent,
            replaced = summary.replaced.len(),
            unchanged = summary.unchanged.len(),
            synthesized = summary.synthesized.len(),
            "aggregate loaded"
        );
        Ok(summary)
    }

    /// Reload one section from the store, leaving every other section as it is
    pub(crate) async fn refresh_section(&self, key: &SectionKey) -> EngineResult<()> {
        self.state.registry.get(key)?;
        let parent = self.state.parent().ok_or(EngineError::NotLoaded)?;
        self.ensure_idle()?;

        let aggregate = self.fetch(&parent, true).await?;
        let mut fresh = map_sections(&self.state.registry, &aggregate, &self.state.config.parent_id_field)?;
        let mapped = fresh
            .shift_remove(key)
            .ok_or_else(|| ConfigurationError::UnknownSection(key.clone()))?;

        let mut loaded = self.state.loaded.write();
        self.ensure_idle()?;
        if loaded.parent.as_ref() != Some(&parent) {
            warn!(section = %key, aggregate = %parent, "aggregate changed during refresh; dropping result");
            return Ok(());
        }
        loaded.sections.insert(key.clone(), mapped.section);
        debug!(section = %key, aggregate = %parent, "section refreshed");
        Ok(())
    }

    async fn fetch(&self, parent: &AggregateId, force_refresh: bool) -> EngineResult<Aggregate> {
        self.state
            .source
            .load_aggregate(parent, force_refresh)
            .await
            .map_err(|err| {
                warn!(aggregate = %parent, error = %err, "aggregate fetch failed");
                EngineError::Fetch {
                    aggregate: parent.clone(),
                    message: err.to_string(),
                }
            })?
            .ok_or_else(|| EngineError::AggregateNotFound(parent.clone()))
    }

    fn ensure_idle(&self) -> EngineResult<()> {
        match self.state.guards.first_busy() {
            Some(busy) => Err(EngineError::Busy(busy)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dh_store::{FnValidator, SectionKind};
    use serde_json::json;

    fn config(required: bool) -> Arc<SectionConfig> {
        let mut builder = SectionConfig::builder("collar", SectionKind::Single { id_field: "CollarId" })
            .validators(FnValidator::new(|_| Vec::new(), |_| Vec::new()))
            .empty_record(|| Record::new().with("HoleId", ""));
        if required {
            builder = builder.required();
        }
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn ensure_default_synthesizes_required_record() {
        let mut store = SectionStore::new(config(true));
        assert!(ensure_default(&mut store, &AggregateId::new("DH-7"), "DrillHoleId"));

        let data = store.data();
        assert_eq!(data.text("DrillHoleId"), Some("DH-7"));
        assert_eq!(data.text("HoleId"), Some(""));
        assert!(data.row_id("CollarId").is_some());
        assert_eq!(data.row_status(), RowStatus::Draft);
        assert!(store.is_dirty());
        assert!(store.is_new());
    }

    #[test]
    fn ensure_default_uses_fresh_ids() {
        let mut a = SectionStore::new(config(true));
        let mut b = SectionStore::new(config(true));
        ensure_default(&mut a, &AggregateId::new("DH-7"), "DrillHoleId");
        ensure_default(&mut b, &AggregateId::new("DH-7"), "DrillHoleId");
        assert_ne!(a.data().row_id("CollarId"), b.data().row_id("CollarId"));
    }

    #[test]
    fn ensure_default_skips_optional_sections() {
        let mut store = SectionStore::new(config(false));
        assert!(!ensure_default(&mut store, &AggregateId::new("DH-7"), "DrillHoleId"));
        assert!(!store.is_dirty());
        assert!(!store.is_new());
    }

    #[test]
    fn single_record_skips_inactive_rows() {
        let aggregate = Aggregate::new("DH-7").with_section(
            "collar",
            vec![
                Record::from_value(json!({"CollarId": "old", "ActiveInd": false})).unwrap(),
                Record::from_value(json!({"CollarId": "cur", "ActiveInd": true})).unwrap(),
            ],
        );
        let record = single_record(&aggregate, &config(true)).unwrap();
        assert_eq!(record.text("CollarId"), Some("cur"));
        assert!(single_record(&Aggregate::new("DH-8"), &config(true)).is_none());
    }

    #[test]
    fn same_state_compares_loaded_content() {
        let cfg = config(false);
        let mut a = SectionStore::new(Arc::clone(&cfg));
        let mut b = SectionStore::new(cfg);
        let record = Record::new().with("CollarId", "C1").with("rv", "3");
        a.load(record.clone());
        b.load(record);
        assert!(same_state(&Section::Single(a.clone()), &Section::Single(b.clone())));

        b.update_fields(&Record::new().with("HoleId", "x"));
        assert!(!same_state(&Section::Single(a), &Section::Single(b)));
    }
}

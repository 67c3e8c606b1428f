//! Raw aggregate as delivered by the aggregate source

use crate::ids::{AggregateId, SectionKey};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every physical record belonging to one parent, grouped by section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Parent identity
    pub id: AggregateId,
    /// Records per section, in storage order
    pub sections: BTreeMap<SectionKey, Vec<Record>>,
}

impl Aggregate {
    /// Empty aggregate
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<AggregateId>) -> Self {
        Self {
            id: id.into(),
            sections: BTreeMap::new(),
        }
    }

    /// Builder-style section insertion
    #[inline]
    #[must_use]
    pub fn with_section(mut self, key: impl Into<SectionKey>, records: Vec<Record>) -> Self {
        self.sections.insert(key.into(), records);
        self
    }

    /// Records of one section; empty when the section has none
    #[must_use]
    pub fn records(&self, key: &SectionKey) -> &[Record] {
        self.sections.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

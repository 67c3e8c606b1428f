//! Collection (grid) section store

use crate::error::StoreError;
use crate::registry::{SectionConfig, SectionKind};
use dh_model::{fields, Record, RowId, RowMetadata, RowStatus, RowVersion, RowVersionMap, ValidationResult};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Edit state of an ordered collection section
///
/// Rows are never removed from `data` by editing; deletion is a flag in the
/// row's [`RowMetadata`]. Every row that ever entered the store keeps its
/// metadata entry until the next load.
#[derive(Debug, Clone)]
pub struct CollectionSectionStore {
    config: Arc<SectionConfig>,
    data: Vec<Record>,
    original_data: Vec<Record>,
    row_metadata: IndexMap<RowId, RowMetadata>,
    row_versions: RowVersionMap,
    row_revisions: HashMap<RowId, u64>,
    is_dirty: bool,
}

impl CollectionSectionStore {
    /// Empty store
    #[must_use]
    pub fn new(config: Arc<SectionConfig>) -> Self {
        Self {
            config,
            data: Vec::new(),
            original_data: Vec::new(),
            row_metadata: IndexMap::new(),
            row_versions: RowVersionMap::new(),
            row_revisions: HashMap::new(),
            is_dirty: false,
        }
    }

    /// Section configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Arc<SectionConfig> {
        &self.config
    }

    /// Field holding each row's id
    #[inline]
    #[must_use]
    pub fn id_field(&self) -> &'static str {
        self.config.id_field()
    }

    /// Current rows, including soft-deleted ones
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[Record] {
        &self.data
    }

    /// Last committed rows
    #[inline]
    #[must_use]
    pub fn original_data(&self) -> &[Record] {
        &self.original_data
    }

    /// Metadata for every row, in insertion order
    #[inline]
    #[must_use]
    pub fn row_metadata(&self) -> &IndexMap<RowId, RowMetadata> {
        &self.row_metadata
    }

    /// Metadata for one row
    #[inline]
    #[must_use]
    pub fn metadata(&self, id: &RowId) -> Option<&RowMetadata> {
        self.row_metadata.get(id)
    }

    /// Version tokens captured at load or commit
    #[inline]
    #[must_use]
    pub fn row_versions(&self) -> &RowVersionMap {
        &self.row_versions
    }

    /// Version token of one row
    #[inline]
    #[must_use]
    pub fn version(&self, id: &RowId) -> Option<&RowVersion> {
        self.row_versions.get(id)
    }

    /// Unpersisted edits present in any row
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Current state of one row
    #[must_use]
    pub fn row(&self, id: &RowId) -> Option<&Record> {
        self.position(id).map(|index| &self.data[index])
    }

    /// Last committed state of one row
    #[must_use]
    pub fn original_row(&self, id: &RowId) -> Option<&Record> {
        let field = self.id_field();
        self.original_data
            .iter()
            .find(|row| row.row_id(field).as_ref() == Some(id))
    }

    /// Edit counter of one row
    #[inline]
    #[must_use]
    pub fn row_revision(&self, id: &RowId) -> u64 {
        self.row_revisions.get(id).copied().unwrap_or_default()
    }

    /// Rows not soft-deleted, with their ids
    pub fn live_rows(&self) -> impl Iterator<Item = (RowId, &Record)> {
        let field = self.id_field();
        self.data.iter().filter_map(move |row| {
            let id = row.row_id(field)?;
            let deleted = self.row_metadata.get(&id).is_some_and(|m| m.is_deleted);
            (!deleted).then_some((id, row))
        })
    }

    /// Lowest workflow status among live rows; draft when there are none
    #[must_use]
    pub fn section_status(&self) -> RowStatus {
        self.live_rows()
            .map(|(_, row)| row.row_status())
            .min_by_key(|status| status.rank())
            .unwrap_or_default()
    }

    /// Replace with freshly read rows, already in display order
    ///
    /// # Errors
    /// `StoreError::MissingRowId` if a row lacks a value in the id field
    pub fn load(&mut self, rows: Vec<Record>) -> Result<(), StoreError> {
        let field = self.id_field();
        let mut metadata = IndexMap::with_capacity(rows.len());
        let mut versions = RowVersionMap::with_capacity(rows.len());

        for row in &rows {
            let id = row.row_id(field).ok_or_else(|| StoreError::MissingRowId {
                section: self.config.key().clone(),
                field,
            })?;
            let mut meta = RowMetadata::loaded(row.row_status());
            meta.is_deleted = !row.is_active();
            if let Some(version) = row.version() {
                versions.insert(id.clone(), version);
            }
            metadata.insert(id, meta);
        }

        for id in metadata.keys() {
            *self.row_revisions.entry(id.clone()).or_default() += 1;
        }
        self.original_data = rows.clone();
        self.data = rows;
        self.row_metadata = metadata;
        self.row_versions = versions;
        self.is_dirty = false;
        Ok(())
    }

    /// Append a row, assigning an id when the row has none
    ///
    /// # Errors
    /// `StoreError::DuplicateRow` if the id is already present
    pub fn add_row(&mut self, mut row: Record) -> Result<RowId, StoreError> {
        let field = self.id_field();
        let id = match row.row_id(field) {
            Some(id) => id,
            None => {
                let id = RowId::new(uuid::Uuid::new_v4().to_string());
                row.set(field, id.as_str());
                id
            }
        };
        if self.row_metadata.contains_key(&id) {
            return Err(StoreError::DuplicateRow {
                section: self.config.key().clone(),
                row: id,
            });
        }

        self.row_metadata.insert(id.clone(), RowMetadata::added(row.row_status()));
        self.data.push(row);
        self.bump(&id);
        self.is_dirty = true;
        Ok(id)
    }

    /// Merge field edits into one row
    ///
    /// # Errors
    /// `StoreError::RowNotFound` if no row has that id
    pub fn update_row(&mut self, id: &RowId, partial: &Record) -> Result<(), StoreError> {
        let index = self.require(id)?;
        let row = &mut self.data[index];
        row.merge(partial);
        let status = row.row_status();

        let meta = self.row_metadata.entry(id.clone()).or_default();
        meta.touch();
        meta.row_status = status;
        self.bump(id);
        self.is_dirty = true;
        Ok(())
    }

    /// Soft-delete one row
    ///
    /// # Errors
    /// `StoreError::RowNotFound` if no row has that id
    pub fn delete_row(&mut self, id: &RowId) -> Result<(), StoreError> {
        self.set_deleted(id, true)
    }

    /// Undo a soft delete
    ///
    /// # Errors
    /// `StoreError::RowNotFound` if no row has that id
    pub fn restore_row(&mut self, id: &RowId) -> Result<(), StoreError> {
        self.set_deleted(id, false)
    }

    /// Rows with unpersisted edits, soft deletions included
    ///
    /// Rows added and deleted again before ever being saved are left out.
    #[must_use]
    pub fn get_dirty_rows(&self) -> Vec<(RowId, &Record)> {
        let field = self.id_field();
        self.data
            .iter()
            .filter_map(|row| {
                let id = row.row_id(field)?;
                let meta = self.row_metadata.get(&id)?;
                (meta.is_dirty && !(meta.is_new && meta.is_deleted)).then_some((id, row))
            })
            .collect()
    }

    /// Validate one row and record the outcome in its metadata
    ///
    /// # Errors
    /// `StoreError::RowNotFound` if no row has that id
    pub fn validate_row(&mut self, id: &RowId) -> Result<ValidationResult, StoreError> {
        let index = self.require(id)?;
        let result = self.config.validate(&self.data[index]);
        self.row_metadata.entry(id.clone()).or_default().apply_validation(&result);
        Ok(result)
    }

    /// Validate every live row
    pub fn validate_all(&mut self) -> IndexMap<RowId, ValidationResult> {
        let ids: Vec<RowId> = self.live_rows().map(|(id, _)| id).collect();
        ids.into_iter()
            .filter_map(|id| {
                let result = self.validate_row(&id).ok()?;
                Some((id, result))
            })
            .collect()
    }

    /// Discard every unpersisted edit
    ///
    /// Rows added since the last commit leave `data`; their metadata stays,
    /// flagged deleted.
    pub fn reset(&mut self) {
        let field = self.id_field();
        let committed: HashMap<RowId, &Record> = self
            .original_data
            .iter()
            .filter_map(|row| Some((row.row_id(field)?, row)))
            .collect();

        for (id, meta) in &mut self.row_metadata {
            let stale = meta.is_stale;
            match committed.get(id) {
                Some(row) => {
                    *meta = RowMetadata::loaded(row.row_status());
                    meta.is_deleted = !row.is_active();
                    meta.is_stale = stale;
                }
                None => {
                    meta.is_dirty = false;
                    meta.is_deleted = true;
                    meta.validation_errors.clear();
                }
            }
        }

        if self.data != self.original_data {
            for revision in self.row_revisions.values_mut() {
                *revision += 1;
            }
        }
        self.data = self.original_data.clone();
        self.is_dirty = false;
    }

    /// Adopt a persisted row
    ///
    /// `edited_since` is the row revision observed when the write was staged;
    /// edits made while it was in flight stay in `data` and keep the row dirty.
    pub fn commit_row(&mut self, id: &RowId, record: Record, version: Option<RowVersion>, edited_since: u64) {
        let field = self.id_field();
        match self.original_data.iter_mut().find(|row| row.row_id(field).as_ref() == Some(id)) {
            Some(slot) => *slot = record.clone(),
            None => self.original_data.push(record.clone()),
        }

        if let Some(version) = version.or_else(|| record.version()) {
            self.row_versions.insert(id.clone(), version);
        }

        let unchanged = self.row_revision(id) == edited_since;
        let status = record.row_status();
        let meta = self.row_metadata.entry(id.clone()).or_default();
        meta.committed(status);

        if unchanged {
            match self.position(id) {
                Some(index) => self.data[index] = record,
                None => self.data.push(record),
            }
        } else if let Some(index) = self.position(id) {
            let differs = !self.data[index].same_content(&record, fields::BOOKKEEPING);
            debug!(section = %self.config.key(), row = %id, differs, "row edited while its write was in flight");
            if let Some(meta) = self.row_metadata.get_mut(id) {
                meta.is_dirty = differs;
                meta.row_status = self.data[index].row_status();
            }
        }
        self.bump(id);
        self.recompute_dirty();
    }

    /// Flag a row as superseded by a newer stored version
    pub fn mark_stale(&mut self, id: &RowId) {
        if let Some(meta) = self.row_metadata.get_mut(id) {
            meta.is_stale = true;
        }
    }

    fn set_deleted(&mut self, id: &RowId, deleted: bool) -> Result<(), StoreError> {
        let index = self.require(id)?;
        self.data[index].set_active_if_present(!deleted);
        let meta = self.row_metadata.entry(id.clone()).or_default();
        meta.is_deleted = deleted;
        meta.is_dirty = true;
        self.bump(id);
        self.recompute_dirty();
        Ok(())
    }

    fn position(&self, id: &RowId) -> Option<usize> {
        let field = self.id_field();
        self.data.iter().position(|row| row.row_id(field).as_ref() == Some(id))
    }

    fn require(&self, id: &RowId) -> Result<usize, StoreError> {
        self.position(id)
            .ok_or_else(|| StoreError::row_not_found(self.config.key(), id))
    }

    fn bump(&mut self, id: &RowId) {
        *self.row_revisions.entry(id.clone()).or_default() += 1;
    }

    fn recompute_dirty(&mut self) {
        self.is_dirty = self
            .row_metadata
            .values()
            .any(|meta| meta.is_dirty && !(meta.is_new && meta.is_deleted));
    }
}

/// Order rows by the section's physical ordering key
///
/// Numeric ascending; rows without a value sort last. The sort is stable, so
/// storage order breaks ties.
pub fn sort_rows(kind: SectionKind, rows: &mut [Record]) {
    let SectionKind::Collection { order_by: Some(field), .. } = kind else {
        return;
    };
    rows.sort_by(|a, b| match (a.number(field), b.number(field)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

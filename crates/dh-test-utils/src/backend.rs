//! In-memory backing store with a local-first cache

use async_trait::async_trait;
use dh_engine::{AggregateSource, CommittedRow, PersistError, RowWrite, SectionPersistence, UpdateRequest};
use dh_model::{fields, Aggregate, AggregateId, Record, RowId, RowVersion, SectionKey};
use dh_store::SectionRegistry;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Default)]
struct Inner {
    stored: HashMap<AggregateId, Aggregate>,
    cache: HashMap<AggregateId, Aggregate>,
    next_version: u64,
    fail_next_write: Option<String>,
    fail_next_fetch: Option<String>,
}

impl Inner {
    fn bump(&mut self) -> RowVersion {
        self.next_version += 1;
        RowVersion::new(self.next_version.to_string())
    }
}

/// Backing store plus the device cache in front of it
///
/// Cached loads return what the device saw last; forced loads and writes
/// refresh the cache from the store. Every stored row carries an `rv`
/// version token that changes on each write.
#[derive(Debug)]
pub struct MemoryBackend {
    id_fields: HashMap<SectionKey, &'static str>,
    inner: Mutex<Inner>,
    gate: Arc<tokio::sync::Mutex<()>>,
    live: broadcast::Sender<Aggregate>,
    update_calls: AtomicUsize,
    update_row_calls: AtomicUsize,
    load_calls: AtomicUsize,
    forced_loads: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(registry: &SectionRegistry) -> Self {
        let (live, _) = broadcast::channel(16);
        Self {
            id_fields: registry
                .iter()
                .map(|config| (config.key().clone(), config.id_field()))
                .collect(),
            inner: Mutex::new(Inner::default()),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            live,
            update_calls: AtomicUsize::new(0),
            update_row_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            forced_loads: AtomicUsize::new(0),
        }
    }

    /// Store an aggregate, versioning rows that carry no `rv`
    pub fn seed(&self, mut aggregate: Aggregate) {
        let mut inner = self.inner.lock();
        for rows in aggregate.sections.values_mut() {
            for row in rows {
                if row.version().is_none() {
                    let version = inner.bump();
                    row.set(fields::ROW_VERSION, version.as_str());
                }
            }
        }
        inner.cache.insert(aggregate.id.clone(), aggregate.clone());
        inner.stored.insert(aggregate.id.clone(), aggregate);
    }

    /// Current stored state of an aggregate
    pub fn stored(&self, id: &AggregateId) -> Option<Aggregate> {
        self.inner.lock().stored.get(id).cloned()
    }

    /// Current stored state of one row
    pub fn row(&self, id: &AggregateId, section: &str, row: &str) -> Option<Record> {
        let section = SectionKey::new(section);
        let field = self.id_field(&section);
        let row = RowId::new(row);
        self.stored(id)?
            .records(&section)
            .iter()
            .find(|record| record.row_id(field).as_ref() == Some(&row))
            .cloned()
    }

    /// Change a stored row as another writer would; the cache is not updated
    pub fn edit_remotely(&self, id: &AggregateId, section: &str, row: &str, partial: &Record) -> Option<RowVersion> {
        let section = SectionKey::new(section);
        let field = self.id_field(&section);
        let row = RowId::new(row);
        let mut inner = self.inner.lock();
        let version = inner.bump();
        let record = inner
            .stored
            .get_mut(id)?
            .sections
            .get_mut(&section)?
            .iter_mut()
            .find(|record| record.row_id(field).as_ref() == Some(&row))?;
        record.merge(partial);
        record.set(fields::ROW_VERSION, version.as_str());
        Some(version)
    }

    /// Push the stored state of an aggregate to live subscribers
    pub fn publish(&self, id: &AggregateId) -> bool {
        match self.stored(id) {
            Some(aggregate) => self.live.send(aggregate).is_ok(),
            None => false,
        }
    }

    /// Fail the next write with an I/O error
    pub fn fail_next_write(&self, message: &str) {
        self.inner.lock().fail_next_write = Some(message.to_string());
    }

    /// Fail the next fetch with an I/O error
    pub fn fail_next_fetch(&self, message: &str) {
        self.inner.lock().fail_next_fetch = Some(message.to_string());
    }

    /// Hold every write until the returned guard drops
    pub async fn pause_writes(&self) -> tokio::sync::OwnedMutexGuard<()> {
        Arc::clone(&self.gate).lock_owned().await
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn update_row_calls(&self) -> usize {
        self.update_row_calls.load(Ordering::SeqCst)
    }

    /// Every write call, section-wide and row-scoped
    pub fn write_calls(&self) -> usize {
        self.update_calls() + self.update_row_calls()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn forced_loads(&self) -> usize {
        self.forced_loads.load(Ordering::SeqCst)
    }

    fn id_field(&self, section: &SectionKey) -> &'static str {
        self.id_fields.get(section).copied().unwrap_or("id")
    }

    /// Check and apply writes all-or-nothing
    async fn apply(&self, writes: Vec<RowWrite>) -> Result<Vec<CommittedRow>, PersistError> {
        let _gate = self.gate.lock().await;
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next_write.take() {
            return Err(PersistError::Io(message));
        }

        for write in &writes {
            let field = self.id_field(&write.section);
            let actual = inner
                .stored
                .get(&write.parent)
                .and_then(|aggregate| {
                    aggregate
                        .records(&write.section)
                        .iter()
                        .find(|record| record.row_id(field).as_ref() == Some(&write.row_id))
                })
                .and_then(Record::version);
            if actual != write.expected_version {
                return Err(PersistError::Conflict {
                    row: write.row_id.clone(),
                    expected: write.expected_version.clone(),
                    actual,
                });
            }
        }

        let mut committed = Vec::with_capacity(writes.len());
        for write in writes {
            let field = self.id_field(&write.section);
            let version = inner.bump();
            let mut record = write.record.with(fields::ROW_VERSION, version.as_str());
            if write.deleted {
                record.set(fields::ACTIVE, false);
            }
            let rows = inner
                .stored
                .entry(write.parent.clone())
                .or_insert_with(|| Aggregate::new(write.parent.clone()))
                .sections
                .entry(write.section.clone())
                .or_default();
            match rows.iter_mut().find(|row| row.row_id(field).as_ref() == Some(&write.row_id)) {
                Some(slot) => *slot = record.clone(),
                None => rows.push(record.clone()),
            }
            committed.push(CommittedRow {
                row_id: write.row_id,
                record,
                version,
            });

            if let Some(stored) = inner.stored.get(&write.parent).cloned() {
                inner.cache.insert(write.parent, stored);
            }
        }
        Ok(committed)
    }
}

#[async_trait]
impl SectionPersistence for MemoryBackend {
    async fn update(&self, request: UpdateRequest) -> Result<Vec<CommittedRow>, PersistError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.apply(request.rows).await
    }

    async fn update_row(&self, write: RowWrite) -> Result<CommittedRow, PersistError> {
        self.update_row_calls.fetch_add(1, Ordering::SeqCst);
        let mut committed = self.apply(vec![write]).await?;
        committed
            .pop()
            .ok_or_else(|| PersistError::Io("write produced no row".to_string()))
    }
}

#[async_trait]
impl AggregateSource for MemoryBackend {
    async fn load_aggregate(&self, id: &AggregateId, force_refresh: bool) -> Result<Option<Aggregate>, PersistError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if force_refresh {
            self.forced_loads.fetch_add(1, Ordering::SeqCst);
        }
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next_fetch.take() {
            return Err(PersistError::Io(message));
        }
        if force_refresh || !inner.cache.contains_key(id) {
            match inner.stored.get(id).cloned() {
                Some(stored) => {
                    inner.cache.insert(id.clone(), stored);
                }
                None => return Ok(None),
            }
        }
        Ok(inner.cache.get(id).cloned())
    }

    fn subscribe(&self, id: &AggregateId) -> Option<BoxStream<'static, Aggregate>> {
        let receiver = self.live.subscribe();
        let id = id.clone();
        let feed = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(aggregate) => return Some((aggregate, receiver)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |aggregate| futures::future::ready(aggregate.id == id));
        Some(feed.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new(&fixtures::registry());
        backend.seed(fixtures::hole("DH-1"));
        backend
    }

    #[test]
    fn seed_versions_every_row() {
        let backend = backend();
        let stored = backend.stored(&AggregateId::new("DH-1")).unwrap();
        assert!(stored.sections.values().flatten().all(|row| row.version().is_some()));
    }

    #[tokio::test]
    async fn cached_load_hides_remote_edits_until_forced() {
        let backend = backend();
        let id = AggregateId::new("DH-1");
        backend.edit_remotely(&id, fixtures::SURVEY, "SV-1", &Record::new().with("Dip", -55)).unwrap();

        let cached = backend.load_aggregate(&id, false).await.unwrap().unwrap();
        let fresh = backend.load_aggregate(&id, true).await.unwrap().unwrap();
        assert_ne!(cached, fresh);
        assert_eq!(backend.forced_loads(), 1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let backend = backend();
        let id = AggregateId::new("DH-1");
        let current = backend.row(&id, fixtures::SURVEY, "SV-1").unwrap();
        backend.edit_remotely(&id, fixtures::SURVEY, "SV-1", &Record::new().with("Dip", -55)).unwrap();

        let err = backend
            .update_row(RowWrite {
                section: SectionKey::new(fixtures::SURVEY),
                parent: id,
                row_id: RowId::new("SV-1"),
                record: current.clone(),
                prior: Some(current.clone()),
                expected_version: current.version(),
                deleted: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Conflict { .. }));
    }
}

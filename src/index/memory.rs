use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;

use super::{IndexBackend, ModificationLock, RedirectIndexEntry};
use crate::error::StoreError;

/// Backend en memoria para tests y para embebidos sin disco
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, RedirectIndexEntry>,
    locks: Mutex<LockTable>,
}

#[derive(Debug, Default)]
struct LockTable {
    records: Vec<ModificationLock>,
    next_id: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea el backend con entradas ya persistidas
    pub fn with_entries(entries: impl IntoIterator<Item = RedirectIndexEntry>) -> Self {
        let backend = Self::new();
        for entry in entries {
            backend.entries.insert(entry.catalog_id.clone(), entry);
        }
        backend
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IndexBackend for MemoryBackend {
    fn find(&self, catalog_id: &str) -> Result<Option<RedirectIndexEntry>, StoreError> {
        Ok(self.entries.get(catalog_id).map(|entry| entry.value().clone()))
    }

    fn insert(&self, entry: RedirectIndexEntry) -> Result<(), StoreError> {
        match self.entries.entry(entry.catalog_id.clone()) {
            Entry::Occupied(occupied) => Err(StoreError::Duplicate(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    fn update(&self, entry: RedirectIndexEntry) -> Result<(), StoreError> {
        match self.entries.get_mut(&entry.catalog_id) {
            Some(mut current) => {
                *current = entry;
                Ok(())
            }
            None => Err(StoreError::NotFound(entry.catalog_id)),
        }
    }

    fn delete(&self, catalog_id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(catalog_id).is_some())
    }

    fn entries(&self) -> Result<Vec<RedirectIndexEntry>, StoreError> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.catalog_id.cmp(&b.catalog_id));
        Ok(entries)
    }

    fn count_modification_locks(&self) -> Result<u64, StoreError> {
        Ok(self.locks.lock().records.len() as u64)
    }

    fn create_modification_lock(&self, reason: &str) -> Result<ModificationLock, StoreError> {
        let mut table = self.locks.lock();
        table.next_id += 1;
        let lock = ModificationLock {
            id: table.next_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        table.records.push(lock.clone());
        Ok(lock)
    }

    fn release_modification_lock(&self, id: u64) -> Result<bool, StoreError> {
        let mut table = self.locks.lock();
        let before = table.records.len();
        table.records.retain(|lock| lock.id != id);
        Ok(table.records.len() != before)
    }

    fn modification_locks(&self) -> Result<Vec<ModificationLock>, StoreError> {
        Ok(self.locks.lock().records.clone())
    }
}

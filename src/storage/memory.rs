use std::collections::BTreeMap;

use crate::{
    RecordId,
    error::StorageError,
    traits::{RecordBackend, StorageResult, StoreStats},
};

use super::record::{CachedRecord, CachedRecordInput};

/// Volatile backend for tests and ephemeral use. Contents are lost on drop.
#[derive(Debug)]
pub struct MemoryBackend {
    records: BTreeMap<RecordId, CachedRecord>,
    next_id: RecordId,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBackend for MemoryBackend {
    fn insert(&mut self, input: CachedRecordInput) -> StorageResult<RecordId> {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(id, input.with_id(id));
        Ok(id)
    }

    fn fetch_all(&self) -> StorageResult<Vec<CachedRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::RecordNotFound(id))
    }

    fn count(&self) -> usize {
        self.records.len()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            live_records: self.records.len(),
            next_id: self.next_id,
            file_bytes: 0,
            dead_bytes: 0,
        }
    }
}

use crate::{
    RecordId,
    error::StorageError,
    storage::{CachedRecord, CachedRecordInput},
};

pub type StorageResult<T> = Result<T, StorageError>;

/// Point-in-time figures about a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub live_records: usize,
    pub next_id: RecordId,
    /// Size of the backing file, 0 for volatile stores.
    pub file_bytes: u64,
    /// Bytes taken by deleted records and tombstones not yet compacted away.
    pub dead_bytes: u64,
}

/// Storage medium behind a record store.
///
/// A backend is owned by exactly one store worker, which is the only caller of
/// these methods, so implementations need no internal locking.
pub trait RecordBackend: Send + 'static {
    /// Persist a record and return its freshly assigned id.
    fn insert(&mut self, input: CachedRecordInput) -> StorageResult<RecordId>;

    /// Every live record, in ascending id order.
    fn fetch_all(&self) -> StorageResult<Vec<CachedRecord>>;

    /// Remove one record. Fails with `RecordNotFound` if it is already gone.
    fn delete(&mut self, id: RecordId) -> StorageResult<()>;

    /// Number of live records, without reading payloads.
    fn count(&self) -> usize;

    fn stats(&self) -> StoreStats;
}

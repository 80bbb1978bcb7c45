use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use graylog_cache::storage::{CachedRecord, CachedRecordInput, MemoryBackend};
use graylog_cache::{RecordBackend, RecordId, StorageError, StorageResult, StoreStats};

/// Which operations a [`FaultyBackend`] should fail.
#[derive(Clone, Default)]
pub struct Faults {
    pub insert: Arc<AtomicBool>,
    pub fetch: Arc<AtomicBool>,
    pub delete: Arc<AtomicBool>,
}

impl Faults {
    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }
}

/// In-memory backend with switchable failures.
pub struct FaultyBackend {
    inner: MemoryBackend,
    faults: Faults,
}

impl FaultyBackend {
    pub fn new(faults: Faults) -> Self {
        Self {
            inner: MemoryBackend::new(),
            faults,
        }
    }

    pub fn with_records(mut self, inputs: Vec<CachedRecordInput>) -> Self {
        for input in inputs {
            self.inner.insert(input).unwrap();
        }
        self
    }
}

fn injected(op: &str) -> StorageError {
    StorageError::Io(Arc::new(anyhow::anyhow!("injected {} failure", op)))
}

impl RecordBackend for FaultyBackend {
    fn insert(&mut self, input: CachedRecordInput) -> StorageResult<RecordId> {
        if self.faults.insert.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }
        self.inner.insert(input)
    }

    fn fetch_all(&self) -> StorageResult<Vec<CachedRecord>> {
        if self.faults.fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch"));
        }
        self.inner.fetch_all()
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        if self.faults.delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(id)
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

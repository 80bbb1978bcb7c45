//! Enqueue and flush surface over one record store.
//!
//! `cache_log` hands a record to the store worker and returns. `flush_cache`
//! takes one snapshot of the store, offers every record to a submission port and
//! deletes exactly those whose completion reported delivery. Records that were
//! not confirmed stay pending for the next flush, so delivery is at-least-once.
//!
//! Concurrent flushes are not coordinated: a record already in flight from one
//! pass is submitted again by a second pass that snapshots it.

use std::time::Duration;

use futures::future::join_all;
use tokio::{runtime::Handle, sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    Endpoint, RecordId,
    config::{BackendKind, CacheOptions, DecodePolicy},
    error::StorageError,
    storage::{CacheSegment, CachedRecordInput, MemoryBackend, RecordStore, SegmentOptions},
    submit::{Completion, SubmissionPort},
    traits::{RecordBackend, StorageResult, StoreStats},
};

/// Tally of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records in the snapshot.
    pub snapshot: usize,
    pub submitted: usize,
    /// Completed with `true` (deleted, unless the delete itself failed).
    pub delivered: usize,
    /// Completed with `false`.
    pub rejected: usize,
    /// Completion dropped unreported or timed out.
    pub abandoned: usize,
    pub delete_failures: usize,
    /// Records that did not decode and were not submitted.
    pub corrupt: usize,
}

enum Settled {
    Delivered,
    DeliveredDeleteFailed,
    Rejected,
    Abandoned,
}

#[derive(Clone)]
pub struct CacheEngine {
    store: RecordStore,
    runtime: Handle,
    decode_policy: DecodePolicy,
    completion_timeout: Option<Duration>,
}

impl CacheEngine {
    /// Open the backend named by `options` and start its worker on the current
    /// Tokio runtime.
    pub fn open(options: CacheOptions) -> StorageResult<Self> {
        let runtime = Handle::try_current().map_err(|e| StorageError::open(e.into()))?;
        Self::open_with_handle(options, runtime)
    }

    /// Like [`open`](Self::open), with an explicit runtime for the worker and flush tasks.
    pub fn open_with_handle(options: CacheOptions, runtime: Handle) -> StorageResult<Self> {
        let backend: Box<dyn RecordBackend> = match options.backend {
            BackendKind::File => Box::new(CacheSegment::open(
                options.store_path(),
                SegmentOptions {
                    sync_on_write: options.sync_on_write,
                    compact_threshold: options.compact_threshold,
                },
            )?),
            BackendKind::InMemory => Box::new(MemoryBackend::new()),
        };
        Ok(Self::with_backend(backend, &options, runtime))
    }

    /// Build an engine around an already opened backend.
    pub fn with_backend(
        backend: Box<dyn RecordBackend>,
        options: &CacheOptions,
        runtime: Handle,
    ) -> Self {
        let (store, worker) = RecordStore::new(backend, options.batch_size);
        worker.start(&runtime);
        Self {
            store,
            runtime,
            decode_policy: options.decode_policy,
            completion_timeout: options.completion_timeout,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Queue `payload` for `endpoint`. Returns immediately; the record is durable
    /// only once the store worker has written it. Failures are logged, not returned.
    ///
    /// An endpoint that could never be submitted (empty host) is refused here
    /// rather than stored.
    pub fn cache_log(&self, endpoint: &Endpoint, payload: impl Into<Vec<u8>>) {
        let input = CachedRecordInput::new(endpoint, payload.into());
        if let Err(e) = input.validate() {
            error!("Refusing to cache log record for {}: {}", endpoint, e);
            return;
        }
        if let Err(e) = self.store.enqueue(input) {
            error!("Failed to cache log record for {}: {}", endpoint, e);
        }
    }

    /// Whether any record is pending. Blocks until the store worker answers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`has_cache_async`](Self::has_cache_async) there.
    pub fn has_cache(&self) -> bool {
        match self.store.count_blocking() {
            Ok(count) => count > 0,
            Err(e) => {
                warn!("Failed to count cached records: {}", e);
                false
            }
        }
    }

    pub async fn has_cache_async(&self) -> bool {
        self.count().await > 0
    }

    /// Number of pending records. 0 if the store is unreachable.
    pub async fn count(&self) -> usize {
        self.store.count().await.unwrap_or_else(|e| {
            warn!("Failed to count cached records: {}", e);
            0
        })
    }

    pub async fn stats(&self) -> StorageResult<StoreStats> {
        self.store.stats().await
    }

    /// Start a flush pass in the background.
    ///
    /// The returned handle resolves once every submitted record has been
    /// settled; dropping it does not cancel the pass.
    pub fn flush_cache<P: SubmissionPort>(&self, port: P) -> JoinHandle<FlushReport> {
        let engine = self.clone();
        self.runtime.spawn(async move { engine.flush(port).await })
    }

    /// Run one flush pass to completion.
    pub async fn flush<P: SubmissionPort>(&self, port: P) -> FlushReport {
        let mut report = FlushReport::default();

        let records = match self.store.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to fetch cached records, skipping flush: {}", e);
                return report;
            }
        };
        report.snapshot = records.len();

        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let endpoint = match record.endpoint() {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    let err = StorageError::DataCorruption {
                        id: record.id,
                        source: e,
                    };
                    error!("Cached record cannot be submitted: {}", err);
                    report.corrupt += 1;
                    match self.decode_policy {
                        DecodePolicy::Skip => continue,
                        DecodePolicy::Abort => break,
                    }
                }
            };

            let id = record.id;
            let (completion, outcome) = Completion::channel();
            port.submit(endpoint, record.payload, completion);
            report.submitted += 1;
            pending.push(self.settle(id, outcome));
        }

        for settled in join_all(pending).await {
            match settled {
                Settled::Delivered => report.delivered += 1,
                Settled::DeliveredDeleteFailed => {
                    report.delivered += 1;
                    report.delete_failures += 1;
                }
                Settled::Rejected => report.rejected += 1,
                Settled::Abandoned => report.abandoned += 1,
            }
        }

        info!(
            "Flushed log cache: {} submitted, {} delivered, {} rejected, {} abandoned",
            report.submitted, report.delivered, report.rejected, report.abandoned
        );
        report
    }

    /// Wait for one record's completion and delete it if it was delivered.
    async fn settle(&self, id: RecordId, outcome: oneshot::Receiver<bool>) -> Settled {
        let delivered = match self.completion_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, outcome).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Submission of record {} timed out after {:?}", id, timeout);
                    return Settled::Abandoned;
                }
            },
            None => outcome.await,
        };

        match delivered {
            Ok(true) => match self.store.delete(id).await {
                Ok(()) => {
                    debug!("Removed delivered record {}", id);
                    Settled::Delivered
                }
                Err(e) => {
                    warn!("Failed to delete delivered record {}, it will be resubmitted: {}", id, e);
                    Settled::DeliveredDeleteFailed
                }
            },
            Ok(false) => {
                debug!("Record {} not delivered, keeping it", id);
                Settled::Rejected
            }
            Err(_) => {
                warn!("Completion for record {} dropped without an outcome", id);
                Settled::Abandoned
            }
        }
    }
}

use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use crate::{
    RecordId,
    error::StorageError,
    traits::{RecordBackend, StorageResult, StoreStats},
};

use super::record::{CachedRecord, CachedRecordInput};

pub enum StoreOp {
    /// `response_tx` is `None` for fire-and-forget inserts.
    Insert {
        input: CachedRecordInput,
        response_tx: Option<oneshot::Sender<StorageResult<RecordId>>>,
    },
    FetchAll {
        response_tx: oneshot::Sender<StorageResult<Vec<CachedRecord>>>,
    },
    Delete {
        id: RecordId,
        response_tx: oneshot::Sender<StorageResult<()>>,
    },
    Count {
        response_tx: oneshot::Sender<usize>,
    },
    Stats {
        response_tx: oneshot::Sender<StoreStats>,
    },
}

/// Handle to a record store. Every operation is funnelled to a single worker
/// task that owns the backend, so reads, writes and deletes never interleave.
#[derive(Clone)]
pub struct RecordStore {
    op_sender: mpsc::UnboundedSender<StoreOp>,
}

/// The serialized access point: owns the backend and drains the op queue.
pub struct StoreWorker {
    backend: Box<dyn RecordBackend>,
    receiver: mpsc::UnboundedReceiver<StoreOp>,
    batch_size: usize,
}

impl RecordStore {
    /// Create a store around `backend`. The returned worker must be started
    /// before any operation completes.
    pub fn new(backend: Box<dyn RecordBackend>, batch_size: usize) -> (Self, StoreWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = StoreWorker {
            backend,
            receiver: rx,
            batch_size: batch_size.max(1),
        };
        (Self { op_sender: tx }, worker)
    }

    fn send(&self, op: StoreOp) -> StorageResult<()> {
        self.op_sender.send(op).map_err(|_| {
            warn!("Failed to send store operation: worker is gone");
            StorageError::ChannelClosed
        })
    }

    /// Queue an insert without waiting for it. Persist failures are logged by the worker.
    pub fn enqueue(&self, input: CachedRecordInput) -> StorageResult<()> {
        self.send(StoreOp::Insert {
            input,
            response_tx: None,
        })
    }

    pub async fn insert(&self, input: CachedRecordInput) -> StorageResult<RecordId> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::Insert {
            input,
            response_tx: Some(tx),
        })?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }

    /// All records present when the worker services the request.
    pub async fn fetch_all(&self) -> StorageResult<Vec<CachedRecord>> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::FetchAll { response_tx: tx })?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }

    pub async fn delete(&self, id: RecordId) -> StorageResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::Delete {
            id,
            response_tx: tx,
        })?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }

    pub async fn count(&self) -> StorageResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::Count { response_tx: tx })?;
        rx.await.map_err(|_| StorageError::ChannelClosed)
    }

    /// Blocking form of [`count`](Self::count).
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn count_blocking(&self) -> StorageResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::Count { response_tx: tx })?;
        rx.blocking_recv().map_err(|_| StorageError::ChannelClosed)
    }

    pub async fn stats(&self) -> StorageResult<StoreStats> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreOp::Stats { response_tx: tx })?;
        rx.await.map_err(|_| StorageError::ChannelClosed)
    }
}

impl StoreWorker {
    /// Spawn the worker on `runtime`. It runs until every `RecordStore` handle
    /// has been dropped and the queue is drained.
    pub fn start(self, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            let mut buf = Vec::with_capacity(self.batch_size);
            let size = self.receiver.recv_many(&mut buf, self.batch_size).await;
            if size == 0 {
                debug!("Record store receiver closed");
                break;
            }

            for op in buf {
                self.handle(op);
            }
        }
    }

    fn handle(&mut self, op: StoreOp) {
        match op {
            StoreOp::Insert { input, response_tx } => {
                let result = self.backend.insert(input);
                match response_tx {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => match result {
                        Ok(id) => debug!("Cached record {}", id),
                        Err(e) => error!("Failed to persist cached record, dropping it: {}", e),
                    },
                }
            }
            StoreOp::FetchAll { response_tx } => {
                let _ = response_tx.send(self.backend.fetch_all());
            }
            StoreOp::Delete { id, response_tx } => {
                let _ = response_tx.send(self.backend.delete(id));
            }
            StoreOp::Count { response_tx } => {
                let _ = response_tx.send(self.backend.count());
            }
            StoreOp::Stats { response_tx } => {
                let _ = response_tx.send(self.backend.stats());
            }
        }
    }
}

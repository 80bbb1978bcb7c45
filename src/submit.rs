//! The delivery contract a flush hands each pending record to.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::Endpoint;

/// Single-use delivery outcome for one submitted record.
///
/// Calling [`complete`](Completion::complete) consumes the handle, so an outcome
/// can be reported at most once. Dropping it unreported leaves the record
/// pending, the same as reporting `false`.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<bool>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report whether the collector durably accepted the payload.
    pub fn complete(self, delivered: bool) {
        // The flush may have stopped waiting (timeout); the record simply stays pending.
        let _ = self.tx.send(delivered);
    }
}

/// Delivers one cached record to its collector.
///
/// Implementations must not block: `submit` is called from the flush task.
/// Start the delivery, return, and call `completion` when it finishes.
pub trait SubmissionPort: Send + Sync + 'static {
    fn submit(&self, endpoint: Endpoint, payload: Vec<u8>, completion: Completion);
}

impl<F> SubmissionPort for F
where
    F: Fn(Endpoint, Vec<u8>, Completion) + Send + Sync + 'static,
{
    fn submit(&self, endpoint: Endpoint, payload: Vec<u8>, completion: Completion) {
        self(endpoint, payload, completion)
    }
}

/// Awaitable delivery, for transports that are naturally async.
#[async_trait]
pub trait AsyncSubmissionPort: Send + Sync + 'static {
    /// Returns `true` iff the collector durably accepted the payload.
    async fn deliver(&self, endpoint: &Endpoint, payload: &[u8]) -> bool;
}

/// Runs each delivery of an [`AsyncSubmissionPort`] on its own task.
pub struct SpawnedPort<T> {
    port: Arc<T>,
}

impl<T: AsyncSubmissionPort> SpawnedPort<T> {
    pub fn new(port: T) -> Self {
        Self {
            port: Arc::new(port),
        }
    }

    pub fn from_arc(port: Arc<T>) -> Self {
        Self { port }
    }
}

impl<T: AsyncSubmissionPort> SubmissionPort for SpawnedPort<T> {
    fn submit(&self, endpoint: Endpoint, payload: Vec<u8>, completion: Completion) {
        let port = self.port.clone();
        tokio::spawn(async move {
            let delivered = port.deliver(&endpoint, &payload).await;
            completion.complete(delivered);
        });
    }
}

use std::sync::{Arc, Mutex};

use graylog_cache::{Completion, Endpoint, SubmissionPort};
use tokio::sync::mpsc;

/// Port that answers every submission on the spot.
#[derive(Clone)]
pub struct AnsweringPort {
    delivered: bool,
    submissions: Arc<Mutex<Vec<(Endpoint, Vec<u8>)>>>,
}

impl AnsweringPort {
    pub fn accepting() -> Self {
        Self::new(true)
    }

    pub fn rejecting() -> Self {
        Self::new(false)
    }

    fn new(delivered: bool) -> Self {
        Self {
            delivered,
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submissions(&self) -> Vec<(Endpoint, Vec<u8>)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_payloads(&self) -> Vec<Vec<u8>> {
        self.submissions().into_iter().map(|(_, p)| p).collect()
    }
}

impl SubmissionPort for AnsweringPort {
    fn submit(&self, endpoint: Endpoint, payload: Vec<u8>, completion: Completion) {
        self.submissions.lock().unwrap().push((endpoint, payload));
        completion.complete(self.delivered);
    }
}

pub struct Submitted {
    pub endpoint: Endpoint,
    pub payload: Vec<u8>,
    pub completion: Completion,
}

/// Port that forwards every submission to the test, which decides when and how
/// to complete it.
#[derive(Clone)]
pub struct HoldingPort {
    tx: mpsc::UnboundedSender<Submitted>,
}

impl HoldingPort {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Submitted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SubmissionPort for HoldingPort {
    fn submit(&self, endpoint: Endpoint, payload: Vec<u8>, completion: Completion) {
        let _ = self.tx.send(Submitted {
            endpoint,
            payload,
            completion,
        });
    }
}

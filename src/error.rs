use std::sync::Arc;

use thiserror::Error;

use crate::RecordId;

/// Record store errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Failed to open store: {0}")]
    Open(Arc<anyhow::Error>),

    #[error("IO error: {0}")]
    Io(Arc<anyhow::Error>),

    #[error("Record {0} not found")]
    RecordNotFound(RecordId),

    #[error("Corrupted record {id}: {source}")]
    DataCorruption {
        id: RecordId,
        #[source]
        source: DecodeError,
    },

    #[error("Store worker channel closed")]
    ChannelClosed,
}

impl StorageError {
    pub(crate) fn io(err: anyhow::Error) -> Self {
        StorageError::Io(Arc::new(err))
    }

    pub(crate) fn open(err: anyhow::Error) -> Self {
        StorageError::Open(Arc::new(err))
    }
}

/// Reasons a stored record cannot be turned back into an endpoint and payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown log type {0:?}")]
    UnknownLogType(String),

    #[error("missing host")]
    MissingHost,

    #[error("port {0} out of range")]
    PortOutOfRange(u32),
}

//! Durable buffer for outbound log records.
//!
//! Records that cannot (or should not) be sent to a collector right away are
//! cached on local storage with [`CacheEngine::cache_log`]. A later
//! [`CacheEngine::flush_cache`] offers every cached record to a
//! [`SubmissionPort`] and removes only the ones the port confirms as delivered.
//!
//! ```rust,ignore
//! let engine = CacheEngine::open(CacheOptions::for_app(cache_root, "com.example.app"))?;
//! engine.cache_log(&Endpoint::new(LogType::Error, "collector.example", 12201), payload);
//!
//! if engine.has_cache_async().await {
//!     engine.flush_cache(|endpoint, payload, completion: Completion| {
//!         tokio::spawn(async move { completion.complete(send(endpoint, payload).await) });
//!     });
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod storage;
pub mod submit;
pub mod traits;
pub mod types;

pub use config::{BackendKind, CacheOptions, DecodePolicy};
pub use engine::{CacheEngine, FlushReport};
pub use error::{DecodeError, StorageError};
pub use submit::{AsyncSubmissionPort, Completion, SpawnedPort, SubmissionPort};
pub use traits::{RecordBackend, StorageResult, StoreStats};
pub use types::{Endpoint, LogType, RecordId};

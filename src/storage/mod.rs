//! Durable storage for pending log records.
//!
//! Records live in an append-only segment file: inserts and delete tombstones
//! are framed with a header and CRC, and an in-memory index of live records is
//! rebuilt by replaying the file on open. A volatile map backend offers the same
//! interface for tests and ephemeral use.
//!
//! # Module Structure
//!
//! - `record`: persisted record schema and entry framing
//! - `segment`: append-only file backend with replay and compaction
//! - `memory`: in-memory backend
//! - `store`: single worker task serializing all access to a backend

mod memory;
mod record;
mod segment;
mod store;


pub use memory::MemoryBackend;

pub use record::{
    CachedRecord, CachedRecordInput, DeleteRecord, ENTRY_HEADER_SIZE, ENTRY_MAGIC_NUM,
    EntryHeader, EntryType, WatermarkRecord,
};

pub use segment::{CacheSegment, RecordMeta, SegmentOptions};

pub use store::{RecordStore, StoreOp, StoreWorker};

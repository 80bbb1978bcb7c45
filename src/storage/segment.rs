use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::Write,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::{
    RecordId,
    error::StorageError,
    traits::{RecordBackend, StorageResult, StoreStats},
};

use super::record::{
    CachedRecord, CachedRecordInput, DeleteRecord, ENTRY_HEADER_SIZE, EntryHeader, EntryType,
    WatermarkRecord,
};

// Cache segment file format:
// | EntryHeader [ insert | delete | watermark ] | EntryHeader [ ... ] | ...
//
// Inserts carry a full `CachedRecord`, deletes a tombstone for one id. A
// compacted file starts with a watermark holding the next id to assign.

/// Location of one live record body inside the segment file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub offset: u64,
    pub size: u64,
}

impl RecordMeta {
    /// On-disk footprint including the frame header.
    fn framed_size(&self) -> u64 {
        self.size + ENTRY_HEADER_SIZE as u64
    }
}

#[derive(Debug, Clone)]
pub struct SegmentOptions {
    pub sync_on_write: bool,
    pub compact_threshold: u64,
}

/// Append-only file backend. Deletes append tombstones; the live set is kept in
/// an in-memory index rebuilt by replaying the file on open.
pub struct CacheSegment {
    path: PathBuf,
    file: File,
    index: BTreeMap<RecordId, RecordMeta>,
    next_id: RecordId,
    file_len: u64,
    dead_bytes: u64,
    options: SegmentOptions,
}

impl CacheSegment {
    /// Open or create the segment at `path`, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>, options: SegmentOptions) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        Self::open_inner(path, options).map_err(|e| {
            warn!("Failed to open cache segment: {:#}", e);
            StorageError::open(e)
        })
    }

    fn open_inner(path: PathBuf, options: SegmentOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating cache directory {}", parent.display()))?;
            }
        }

        let file = open_append(&path)?;

        let mut segment = Self {
            path,
            file,
            index: BTreeMap::new(),
            next_id: 1,
            file_len: 0,
            dead_bytes: 0,
            options,
        };
        segment.replay()?;

        info!(
            "Opened cache segment {} with {} pending records",
            segment.path.display(),
            segment.index.len()
        );
        Ok(segment)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the index by reading the file front to back.
    ///
    /// Replay stops at the first incomplete or corrupt frame; everything from
    /// there on is cut off so that subsequent appends land on a clean boundary.
    fn replay(&mut self) -> Result<()> {
        self.index.clear();
        self.dead_bytes = 0;

        let file_size = self.file.metadata()?.len();
        let mut offset: u64 = 0;
        let mut header_buf = [0u8; ENTRY_HEADER_SIZE as usize];

        while offset < file_size {
            if offset + ENTRY_HEADER_SIZE as u64 > file_size {
                warn!("Incomplete header at offset {}, stopping replay", offset);
                break;
            }

            self.file.read_exact_at(&mut header_buf, offset)?;
            let header = match EntryHeader::deserialize(&header_buf) {
                Ok(h) => h,
                Err(e) => {
                    warn!("Failed to deserialize header at offset {}: {}", offset, e);
                    break;
                }
            };

            let data_offset = offset + ENTRY_HEADER_SIZE as u64;
            let data_size = header.body_size();
            if data_offset + data_size > file_size {
                warn!("Incomplete entry at offset {}, stopping replay", offset);
                break;
            }

            let mut data_buf = vec![0u8; data_size as usize];
            self.file.read_exact_at(&mut data_buf, data_offset)?;

            let actual_crc = crc32fast::hash(&data_buf);
            if actual_crc != header.crc {
                warn!(
                    "CRC mismatch at offset {}: expected {}, got {}",
                    offset, header.crc, actual_crc
                );
                break;
            }

            match header.entry_type {
                EntryType::Insert => match CachedRecord::deserialize(&data_buf) {
                    Ok((record, _)) => {
                        self.index.insert(
                            record.id,
                            RecordMeta {
                                offset: data_offset,
                                size: data_size,
                            },
                        );
                        self.next_id = self.next_id.max(record.id + 1);
                    }
                    Err(e) => {
                        warn!("Failed to deserialize record at offset {}: {}", offset, e);
                        self.dead_bytes += header.size as u64;
                    }
                },
                EntryType::Delete => {
                    match DeleteRecord::deserialize(&data_buf) {
                        Ok((tombstone, _)) => {
                            if let Some(meta) = self.index.remove(&tombstone.id) {
                                self.dead_bytes += meta.framed_size();
                            }
                        }
                        Err(e) => {
                            warn!("Failed to deserialize tombstone at offset {}: {}", offset, e);
                        }
                    }
                    self.dead_bytes += header.size as u64;
                }
                EntryType::Watermark => match WatermarkRecord::deserialize(&data_buf) {
                    Ok((watermark, _)) => {
                        self.next_id = self.next_id.max(watermark.next_id);
                    }
                    Err(e) => {
                        warn!("Failed to deserialize watermark at offset {}: {}", offset, e);
                    }
                },
            }

            offset += header.size as u64;
        }

        if offset < file_size {
            warn!(
                "Discarding {} trailing bytes of {}",
                file_size - offset,
                self.path.display()
            );
            self.file.set_len(offset)?;
            self.file.sync_data()?;
        }
        self.file_len = offset;

        debug!(
            "Replayed {}: {} live records, next id {}, {} dead bytes",
            self.path.display(),
            self.index.len(),
            self.next_id,
            self.dead_bytes
        );
        Ok(())
    }

    /// Append one framed entry and return the offset of its body.
    fn append(&mut self, entry_type: EntryType, body: &[u8]) -> Result<u64> {
        let header = EntryHeader::for_body(entry_type, body)?;
        let mut buf = Vec::with_capacity(header.size as usize);
        buf.extend_from_slice(&header.serialize());
        buf.extend_from_slice(body);

        let start = self.file_len;
        let written = self.file.write_all(&buf).and_then(|_| {
            if self.options.sync_on_write {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            warn!("Failed to append entry to cache segment: {}", e);
            // Cut off whatever part of the frame made it to disk.
            if let Err(e) = self.file.set_len(start) {
                warn!("Failed to roll back partial entry: {}", e);
            }
            return Err(e.into());
        }

        self.file_len += buf.len() as u64;
        Ok(start + ENTRY_HEADER_SIZE as u64)
    }

    fn read_record(&self, meta: &RecordMeta) -> Result<CachedRecord> {
        let mut buf = vec![0u8; meta.size as usize];
        self.file.read_exact_at(&mut buf, meta.offset).map_err(|e| {
            warn!("Failed to read cached record from file: {}", e);
            e
        })?;
        let (record, _) = CachedRecord::deserialize(&buf)?;
        Ok(record)
    }

    fn should_compact(&self) -> bool {
        self.dead_bytes > self.options.compact_threshold
    }

    /// Rewrite the live records into a fresh file and swap it in.
    pub fn compact(&mut self) -> Result<()> {
        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;

        let mut buf = Vec::new();
        let watermark = WatermarkRecord {
            next_id: self.next_id,
        }
        .serialize()?;
        buf.extend_from_slice(&EntryHeader::for_body(EntryType::Watermark, &watermark)?.serialize());
        buf.extend_from_slice(&watermark);

        let mut new_index = BTreeMap::new();
        for (id, meta) in &self.index {
            let mut body = vec![0u8; meta.size as usize];
            self.file.read_exact_at(&mut body, meta.offset)?;
            let header = EntryHeader::for_body(EntryType::Insert, &body)?;
            buf.extend_from_slice(&header.serialize());
            new_index.insert(
                *id,
                RecordMeta {
                    offset: buf.len() as u64,
                    size: meta.size,
                },
            );
            buf.extend_from_slice(&body);
        }

        let swapped = install_replacement(tmp, &tmp_path, &self.path, &buf);

        // Until the rename succeeds the old file and index stay authoritative.
        let file = match swapped {
            Ok(file) => file,
            Err(e) => {
                if let Err(e) = fs::remove_file(&tmp_path) {
                    warn!("Failed to remove {}: {}", tmp_path.display(), e);
                }
                return Err(e);
            }
        };
        self.file = file;
        let reclaimed = self.file_len.saturating_sub(buf.len() as u64);
        self.index = new_index;
        self.file_len = buf.len() as u64;
        self.dead_bytes = 0;

        if let Err(e) = sync_parent_dir(&self.path) {
            warn!("Failed to sync directory of {}: {:#}", self.path.display(), e);
        }

        info!(
            "Compacted {}: {} live records, reclaimed {} bytes",
            self.path.display(),
            self.index.len(),
            reclaimed
        );
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// Write `buf` into the temporary file and rename it over `path`. The returned
/// append handle is opened before the rename, so once the new file is in place
/// there is nothing left that can fail.
fn install_replacement(mut tmp: File, tmp_path: &Path, path: &Path, buf: &[u8]) -> Result<File> {
    tmp.write_all(buf)?;
    tmp.sync_all()?;
    let file = open_append(tmp_path)?;
    fs::rename(tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(file)
}

fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

impl RecordBackend for CacheSegment {
    fn insert(&mut self, input: CachedRecordInput) -> StorageResult<RecordId> {
        let id = self.next_id;
        let record = input.with_id(id);
        let body = record.serialize().map_err(StorageError::io)?;
        let offset = self
            .append(EntryType::Insert, &body)
            .map_err(StorageError::io)?;

        self.index.insert(
            id,
            RecordMeta {
                offset,
                size: body.len() as u64,
            },
        );
        self.next_id += 1;
        Ok(id)
    }

    fn fetch_all(&self) -> StorageResult<Vec<CachedRecord>> {
        self.index
            .iter()
            .map(|(id, meta)| {
                let record = self.read_record(meta).map_err(StorageError::io)?;
                if record.id != *id {
                    return Err(StorageError::io(anyhow!(
                        "Index points record {} at an entry for {}",
                        id,
                        record.id
                    )));
                }
                Ok(record)
            })
            .collect()
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        let meta = *self.index.get(&id).ok_or(StorageError::RecordNotFound(id))?;

        let body = DeleteRecord { id }.serialize().map_err(StorageError::io)?;
        self.append(EntryType::Delete, &body)
            .map_err(StorageError::io)?;

        self.index.remove(&id);
        self.dead_bytes += meta.framed_size() + ENTRY_HEADER_SIZE as u64 + body.len() as u64;

        if self.should_compact() {
            if let Err(e) = self.compact() {
                warn!("Failed to compact cache segment: {:#}", e);
            }
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.index.len()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            live_records: self.index.len(),
            next_id: self.next_id,
            file_bytes: self.file_len,
            dead_bytes: self.dead_bytes,
        }
    }
}

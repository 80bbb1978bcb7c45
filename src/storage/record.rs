use anyhow::{Result, anyhow};
use bincode::{Decode, Encode};
use tracing::warn;

use crate::{Endpoint, LogType, RecordId, error::DecodeError};

/// Fields of a record before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecordInput {
    pub log_type: String,
    pub host: String,
    pub port: u32,
    pub payload: Vec<u8>,
}

impl CachedRecordInput {
    pub fn new(endpoint: &Endpoint, payload: Vec<u8>) -> Self {
        Self {
            log_type: endpoint.log_type.as_str().to_string(),
            host: endpoint.host.clone(),
            port: endpoint.port as u32,
            payload,
        }
    }

    /// Check that the record can be turned back into an endpoint once stored.
    pub fn validate(&self) -> Result<(), DecodeError> {
        decode_endpoint(&self.log_type, &self.host, self.port).map(|_| ())
    }

    pub(crate) fn with_id(self, id: RecordId) -> CachedRecord {
        CachedRecord {
            id,
            log_type: self.log_type,
            host: self.host,
            port: self.port,
            payload: self.payload,
        }
    }
}

/// A pending log record as persisted. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Decode, Encode)]
pub struct CachedRecord {
    pub id: RecordId,
    pub log_type: String,
    pub host: String,
    pub port: u32,
    pub payload: Vec<u8>,
}

impl CachedRecord {
    /// Rebuild the endpoint this record was cached for.
    pub fn endpoint(&self) -> Result<Endpoint, DecodeError> {
        decode_endpoint(&self.log_type, &self.host, self.port)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<(Self, usize)> {
        let config = bincode::config::standard();
        Ok(bincode::decode_from_slice(data, config).map_err(|e| {
            warn!("Failed to deserialize cached record: {}", e);
            e
        })?)
    }
}

fn decode_endpoint(log_type: &str, host: &str, port: u32) -> Result<Endpoint, DecodeError> {
    let log_type: LogType = log_type.parse()?;
    if host.is_empty() {
        return Err(DecodeError::MissingHost);
    }
    let port = u16::try_from(port).map_err(|_| DecodeError::PortOutOfRange(port))?;
    Ok(Endpoint {
        log_type,
        host: host.to_string(),
        port,
    })
}

/// Tombstone for a delivered record.
#[derive(Debug, Clone, Decode, Encode)]
pub struct DeleteRecord {
    pub id: RecordId,
}

impl DeleteRecord {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<(Self, usize)> {
        let config = bincode::config::standard();
        Ok(bincode::decode_from_slice(data, config).map_err(|e| {
            warn!("Failed to deserialize delete record: {}", e);
            e
        })?)
    }
}

/// Lowest id the store may hand out next. Written first in a compacted log so
/// ids of records dropped by compaction are not handed out again.
#[derive(Debug, Clone, Decode, Encode)]
pub struct WatermarkRecord {
    pub next_id: RecordId,
}

impl WatermarkRecord {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<(Self, usize)> {
        let config = bincode::config::standard();
        Ok(bincode::decode_from_slice(data, config).map_err(|e| {
            warn!("Failed to deserialize watermark record: {}", e);
            e
        })?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Insert,
    Delete,
    Watermark,
}

impl EntryType {
    fn code(self) -> u32 {
        match self {
            EntryType::Insert => 1,
            EntryType::Delete => 2,
            EntryType::Watermark => 3,
        }
    }

    fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(EntryType::Insert),
            2 => Ok(EntryType::Delete),
            3 => Ok(EntryType::Watermark),
            _ => Err(anyhow!("Invalid entry type {}", code)),
        }
    }
}

pub const ENTRY_MAGIC_NUM: u32 = 0x_4752_4c43;
pub const ENTRY_HEADER_SIZE: u32 = 16; // 4 + 4 + 4 + 4 = 16 bytes

/// Framed size of an entry whose body is `body_len` bytes. The size field is
/// 32 bits wide, so larger bodies cannot be framed.
pub fn frame_size(body_len: usize) -> Result<u32> {
    u32::try_from(body_len)
        .ok()
        .and_then(|len| len.checked_add(ENTRY_HEADER_SIZE))
        .ok_or_else(|| anyhow!("Entry body of {} bytes is too large to frame", body_len))
}

/// Fixed-size frame preceding every entry in the log file.
/// `size` covers the header itself plus the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub size: u32,
    pub entry_type: EntryType,
    pub magic_num: u32,
    pub crc: u32,
}

impl EntryHeader {
    pub fn new(size: u32, entry_type: EntryType, crc: u32) -> Self {
        Self {
            size,
            entry_type,
            magic_num: ENTRY_MAGIC_NUM,
            crc,
        }
    }

    /// Header for `body`, with size and checksum filled in.
    pub fn for_body(entry_type: EntryType, body: &[u8]) -> Result<Self> {
        Ok(Self::new(
            frame_size(body.len())?,
            entry_type,
            crc32fast::hash(body),
        ))
    }

    pub fn body_size(&self) -> u64 {
        (self.size - ENTRY_HEADER_SIZE) as u64
    }

    pub fn serialize(&self) -> [u8; ENTRY_HEADER_SIZE as usize] {
        let mut buf = [0u8; ENTRY_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.entry_type.code().to_le_bytes());
        buf[8..12].copy_from_slice(&self.magic_num.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < ENTRY_HEADER_SIZE as usize {
            return Err(anyhow!("Invalid length"));
        }

        let read_u32 = |at: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&data[at..at + 4]);
            u32::from_le_bytes(bytes)
        };

        let size = read_u32(0);
        let entry_type = EntryType::from_code(read_u32(4))?;
        let magic_num = read_u32(8);
        let crc = read_u32(12);

        if magic_num != ENTRY_MAGIC_NUM {
            return Err(anyhow!("Invalid magic number"));
        }
        if size < ENTRY_HEADER_SIZE {
            return Err(anyhow!("Invalid entry size {}", size));
        }

        Ok(Self {
            size,
            entry_type,
            magic_num,
            crc,
        })
    }
}

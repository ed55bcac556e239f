//! Journal Entry definitions
//!
//! Defines the structure and framing of individual journal entries.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKey};
use crate::error::{PagedKvError, Result};
use crate::unix_millis;

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// One committed mutation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Mutations applied atomically by one commit
    pub mutations: Vec<Mutation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// A single mutation of the entity map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Create or overwrite an entity
    Put(Entity),

    /// Remove an entity
    Delete(EntityKey),
}

/// Body of a frame (everything but the LSN, which lives in the header)
#[derive(Serialize, Deserialize)]
struct Body {
    mutations: Vec<Mutation>,
    timestamp: u64,
}

#[derive(Serialize)]
struct BodyRef<'a> {
    mutations: &'a [Mutation],
    timestamp: u64,
}

impl JournalEntry {
    pub fn new(lsn: u64, mutations: Vec<Mutation>) -> Self {
        Self {
            lsn,
            mutations,
            timestamp: unix_millis(),
        }
    }

    /// Encode the entry as one frame
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = self.encode_body()?;
        let len = u32::try_from(data.len()).map_err(|_| {
            PagedKvError::JournalWrite(format!("entry of {} bytes is too large", data.len()))
        })?;
        let crc = frame_crc(self.lsn, len, &data);

        let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
        out.extend_from_slice(&self.lsn.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&data);
        Ok(out)
    }

    /// Decode one frame, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (lsn, crc, len) = parse_header(bytes)?;
        let data = bytes.get(HEADER_SIZE..HEADER_SIZE + len as usize).ok_or_else(|| {
            PagedKvError::JournalCorruption(format!(
                "frame truncated: expected {} data bytes, found {}",
                len,
                bytes.len().saturating_sub(HEADER_SIZE)
            ))
        })?;
        Self::from_parts(lsn, crc, len, data)
    }

    /// Size of this entry once framed
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + self.encode_body()?.len())
    }

    /// CRC of the framed entry
    pub fn compute_crc(&self) -> Result<u32> {
        let data = self.encode_body()?;
        Ok(frame_crc(self.lsn, data.len() as u32, &data))
    }

    pub(crate) fn from_parts(lsn: u64, crc: u32, len: u32, data: &[u8]) -> Result<Self> {
        let actual = frame_crc(lsn, len, data);
        if actual != crc {
            return Err(PagedKvError::JournalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:#010x}, computed {:#010x}",
                lsn, crc, actual
            )));
        }

        let body: Body = bincode::deserialize(data)
            .map_err(|e| PagedKvError::JournalCorruption(format!("undecodable entry: {}", e)))?;

        Ok(Self {
            lsn,
            mutations: body.mutations,
            timestamp: body.timestamp,
        })
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        bincode::serialize(&BodyRef {
            mutations: &self.mutations,
            timestamp: self.timestamp,
        })
        .map_err(|e| PagedKvError::Serialization(e.to_string()))
    }
}

/// Split a frame header into (lsn, crc, len)
pub(crate) fn parse_header(bytes: &[u8]) -> Result<(u64, u32, u32)> {
    if bytes.len() < HEADER_SIZE {
        return Err(PagedKvError::JournalCorruption(format!(
            "header truncated: {} of {} bytes",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    let mut lsn = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    lsn.copy_from_slice(&bytes[0..8]);
    crc.copy_from_slice(&bytes[8..12]);
    len.copy_from_slice(&bytes[12..16]);

    Ok((
        u64::from_le_bytes(lsn),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    ))
}

fn frame_crc(lsn: u64, len: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

// crates/merchant_extension/src/snapshot.rs
//! Envelope + bincode encoding shared by save files and hot-reload transfers.

use bridge_shared::{StateEnvelope, CURRENT_SCHEMA_HASH, CURRENT_STATE_VERSION, SNAPSHOT_MAGIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is {0} bytes, shorter than its header")]
    Truncated(usize),
    #[error("bad snapshot magic {0:#010x}")]
    BadMagic(u32),
    #[error("snapshot state version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("schema hash {found:#018x} does not match {expected:#018x}")]
    SchemaMismatch { found: u64, expected: u64 },
    #[error("payload needs {needed} bytes but only {available} follow the header")]
    PayloadTruncated { needed: usize, available: usize },
    #[error("buffer holds {available} bytes, snapshot needs {needed}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("snapshot payload could not be (de)serialized: {0}")]
    Codec(#[from] bincode::Error),
}

/// Header plus payload size of `value`'s snapshot.
pub fn encoded_len<T: Serialize>(value: &T) -> Result<usize, SnapshotError> {
    Ok(StateEnvelope::LEN + bincode::serialized_size(value)? as usize)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    let payload = bincode::serialize(value)?;
    let mut bytes = Vec::with_capacity(StateEnvelope::LEN + payload.len());
    bytes.extend_from_slice(StateEnvelope::current(payload.len()).as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Writes the snapshot into a caller-provided buffer, returning the bytes used.
pub fn encode_into<T: Serialize>(value: &T, buf: &mut [u8]) -> Result<usize, SnapshotError> {
    let payload_len = bincode::serialized_size(value)? as usize;
    let needed = StateEnvelope::LEN + payload_len;
    if buf.len() < needed {
        return Err(SnapshotError::BufferTooSmall { needed, available: buf.len() });
    }

    let (header, rest) = buf.split_at_mut(StateEnvelope::LEN);
    header.copy_from_slice(StateEnvelope::current(payload_len).as_bytes());
    bincode::serialize_into(&mut rest[..payload_len], value)?;
    Ok(needed)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SnapshotError> {
    let envelope = StateEnvelope::read(bytes).ok_or(SnapshotError::Truncated(bytes.len()))?;

    if envelope.magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic(envelope.magic));
    }
    if envelope.state_version != CURRENT_STATE_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: envelope.state_version,
            expected: CURRENT_STATE_VERSION,
        });
    }
    if envelope.schema_hash != CURRENT_SCHEMA_HASH {
        return Err(SnapshotError::SchemaMismatch {
            found: envelope.schema_hash,
            expected: CURRENT_SCHEMA_HASH,
        });
    }

    let needed = envelope.payload_len as usize;
    let payload = &bytes[StateEnvelope::LEN..];
    if payload.len() < needed {
        return Err(SnapshotError::PayloadTruncated { needed, available: payload.len() });
    }
    Ok(bincode::deserialize(&payload[..needed])?)
}

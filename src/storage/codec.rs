//! Binary codec for durable bucket payloads.
//!
//! All data is serialized with:
//! - JSON for data (compatible with existing serde attributes)
//! - Length-prefixed format for framing
//! - CRC32 checksum for corruption detection
//! - Version byte for forward compatibility

use std::io::Read;

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use super::StorageError;

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Sanity cap on a single decoded payload (100 MB).
const MAX_ENTRY_SIZE: usize = 100 * 1024 * 1024;

/// Serializes a value to bytes with checksum.
///
/// Format:
/// ```text
/// [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the value cannot be encoded.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value)
        .map_err(|e| StorageError::Serialization(format!("serialization failed: {e}")))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let len = u32::try_from(data.len()).map_err(|_| {
        StorageError::Serialization(format!("payload of {} bytes exceeds frame size", data.len()))
    })?;

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());

    Ok(out)
}

/// Deserializes a value from bytes, verifying checksum.
///
/// # Errors
///
/// Returns [`StorageError::Corruption`] when the envelope is truncated, the
/// version is unknown, the length is implausible, or the checksum does not
/// match; [`StorageError::Serialization`] when the checksummed payload fails
/// to deserialize.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, StorageError> {
    let mut version = [0u8; 1];
    read_frame(reader, &mut version, "version byte")?;

    if version[0] != CODEC_VERSION {
        return Err(StorageError::Corruption(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    read_frame(reader, &mut len_bytes, "length prefix")?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_ENTRY_SIZE {
        return Err(StorageError::Corruption(format!(
            "entry size {len} exceeds maximum {MAX_ENTRY_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    read_frame(reader, &mut data, "payload")?;

    let mut crc_bytes = [0u8; 4];
    read_frame(reader, &mut crc_bytes, "checksum")?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        return Err(StorageError::Corruption(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"
        )));
    }

    serde_json::from_slice(&data)
        .map_err(|e| StorageError::Serialization(format!("deserialization failed: {e}")))
}

fn read_frame(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<(), StorageError> {
    reader
        .read_exact(buf)
        .map_err(|e| StorageError::Corruption(format!("truncated {what}: {e}")))
}

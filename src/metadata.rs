//! Validation of user-supplied metadata on entities and aliases.
//!
//! Metadata is a flat string map. Limits mirror what downstream consumers
//! (audit logs, templated policies) can absorb: a bounded pair count, bounded
//! key and value lengths, a restricted key character set, and a key prefix
//! reserved for system-written annotations.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

/// Maximum number of key/value pairs in one metadata map.
pub const MAX_METADATA_PAIRS: usize = 64;

/// Maximum metadata key length in bytes.
pub const MAX_METADATA_KEY_LENGTH: usize = 128;

/// Maximum metadata value length in bytes.
pub const MAX_METADATA_VALUE_LENGTH: usize = 512;

/// Key prefix reserved for annotations written by the store itself.
pub const RESERVED_KEY_PREFIX: &str = "idgraph-";

fn key_format() -> &'static Regex {
    static KEY_FORMAT: OnceLock<Regex> = OnceLock::new();
    KEY_FORMAT.get_or_init(|| {
        Regex::new("^[a-zA-Z0-9=/+_-]+$").expect("metadata key pattern compiles")
    })
}

/// Validates a full metadata map.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the first offending pair. Pairs are
/// checked in key order.
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if metadata.len() > MAX_METADATA_PAIRS {
        return Err(ValidationError::MetadataTooManyPairs {
            max: MAX_METADATA_PAIRS,
        });
    }
    for (key, value) in metadata {
        validate_meta_pair(key, value)?;
    }
    Ok(())
}

/// Validates a single key/value pair.
///
/// # Errors
///
/// Returns a [`ValidationError`] when the key is empty, either side exceeds
/// its length limit, the key carries the reserved prefix, or the key contains
/// characters outside `[a-zA-Z0-9=/+_-]`.
pub fn validate_meta_pair(key: &str, value: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::MetadataKeyInvalid {
            key: key.to_string(),
        });
    }
    if key.len() > MAX_METADATA_KEY_LENGTH {
        return Err(ValidationError::MetadataKeyTooLong {
            key: key.to_string(),
            max: MAX_METADATA_KEY_LENGTH,
        });
    }
    if value.len() > MAX_METADATA_VALUE_LENGTH {
        return Err(ValidationError::MetadataValueTooLong {
            key: key.to_string(),
            max: MAX_METADATA_VALUE_LENGTH,
        });
    }
    if key.starts_with(RESERVED_KEY_PREFIX) {
        return Err(ValidationError::MetadataKeyReserved {
            key: key.to_string(),
        });
    }
    if !key_format().is_match(key) {
        return Err(ValidationError::MetadataKeyInvalidChars {
            key: key.to_string(),
        });
    }
    Ok(())
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The wire format for persisted cache entries.
//!
//! The cache owns this format; the durable store only transports the
//! resulting strings. A record is a JSON document carrying the payload, the
//! write timestamp as milliseconds since the UNIX epoch, the TTL in
//! milliseconds (`null` for infinite), and the write revision.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CacheEntry, Ttl};

/// An error decoding a persisted cache record.
///
/// Encountering one means the record is corrupt or from an incompatible
/// format; callers drop the record rather than surfacing the error.
#[derive(Debug, thiserror::Error)]
#[error("invalid persisted cache record: {message}")]
pub struct CodecError {
    message: String,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    data: Value,
    written_at_ms: u64,
    ttl_ms: Option<u64>,
    #[serde(default)]
    revision: u64,
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    // A timestamp before the epoch encodes as 0.
    let millis = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Serializes an entry into its persisted string form.
///
/// # Errors
///
/// Returns [`CodecError`] if the payload cannot be rendered as JSON, which
/// for a [`Value`] payload does not happen in practice.
pub fn encode(entry: &CacheEntry<Value>) -> Result<String, CodecError> {
    let record = StoredRecord {
        data: entry.data().clone(),
        written_at_ms: millis_since_epoch(entry.written_at()),
        ttl_ms: match entry.ttl() {
            Ttl::After(ttl) => Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            Ttl::Infinite => None,
        },
        revision: entry.revision(),
    };
    serde_json::to_string(&record).map_err(|error| CodecError {
        message: error.to_string(),
    })
}

/// Parses a persisted string back into an entry.
///
/// # Errors
///
/// Returns [`CodecError`] when the input is not a well-formed record.
pub fn decode(raw: &str) -> Result<CacheEntry<Value>, CodecError> {
    let record: StoredRecord = serde_json::from_str(raw).map_err(|error| CodecError {
        message: error.to_string(),
    })?;
    let written_at = UNIX_EPOCH + Duration::from_millis(record.written_at_ms);
    let ttl = match record.ttl_ms {
        Some(ms) => Ttl::After(Duration::from_millis(ms)),
        None => Ttl::Infinite,
    };
    Ok(CacheEntry::new(record.data, written_at, ttl).with_revision(record.revision))
}

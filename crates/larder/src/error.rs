// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type for caller-visible cache failures.

use std::fmt::Display;
use std::time::Duration;

/// An error from a cache operation that the caller must see.
///
/// Most failure modes inside the cache are contained where they occur
/// (storage trouble degrades to memory-only, corrupt persisted records are
/// dropped); this type covers the rest. It is `Clone` because a coordinated
/// fetch shares its one outcome, success or failure, with every waiter.
///
/// Underlying causes are flattened to rendered messages rather than carried
/// as sources: a typed source chain cannot be cloned across waiters.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The fetcher supplied to `get_or_fetch` failed; nothing was cached.
    #[error("fetch for key `{key}` failed: {message}")]
    Fetch {
        /// The cache key being fetched.
        key: String,
        /// The fetcher's rendered error.
        message: String,
    },

    /// The fetcher exceeded the configured deadline; nothing was cached and
    /// the pending registration was released.
    #[error("fetch for key `{key}` timed out after {timeout:?}")]
    FetchTimeout {
        /// The cache key being fetched.
        key: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// The payload handed to the cache could not be serialized.
    #[error("payload for key `{key}` could not be serialized: {message}")]
    Encode {
        /// The cache key being written.
        key: String,
        /// The serializer's rendered error.
        message: String,
    },

    /// The cached payload does not deserialize into the requested type.
    #[error("cached payload for key `{key}` does not match the requested type: {message}")]
    Decode {
        /// The cache key being read.
        key: String,
        /// The deserializer's rendered error.
        message: String,
    },

    /// The pattern passed to `invalidate_pattern` is not a valid regex.
    #[error("invalid invalidation pattern `{pattern}`: {message}")]
    Pattern {
        /// The rejected pattern source.
        pattern: String,
        /// The regex compiler's rendered error.
        message: String,
    },
}

impl CacheError {
    pub(crate) fn fetch(key: &str, error: &dyn Display) -> Self {
        Self::Fetch {
            key: key.to_owned(),
            message: error.to_string(),
        }
    }

    pub(crate) fn fetch_timeout(key: &str, timeout: Duration) -> Self {
        Self::FetchTimeout {
            key: key.to_owned(),
            timeout,
        }
    }

    pub(crate) fn encode(key: &str, error: &dyn Display) -> Self {
        Self::Encode {
            key: key.to_owned(),
            message: error.to_string(),
        }
    }

    pub(crate) fn decode(key: &str, error: &dyn Display) -> Self {
        Self::Decode {
            key: key.to_owned(),
            message: error.to_string(),
        }
    }

    pub(crate) fn pattern(pattern: &str, error: &dyn Display) -> Self {
        Self::Pattern {
            pattern: pattern.to_owned(),
            message: error.to_string(),
        }
    }
}

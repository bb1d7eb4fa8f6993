// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

/// How long a cached entry remains valid.
///
/// A finite TTL makes the entry stale once its age reaches the duration.
/// [`Ttl::Infinite`] entries never expire on their own and are only removed
/// by explicit invalidation or eviction.
///
/// # Examples
///
/// ```
/// use larder_store::Ttl;
/// use std::time::Duration;
///
/// assert_eq!(Ttl::secs(90), Ttl::After(Duration::from_secs(90)));
/// assert!(Ttl::Infinite.is_infinite());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ttl {
    /// Valid until the entry's age reaches the duration.
    After(Duration),
    /// Never expires; removable only by explicit invalidation.
    Infinite,
}

impl Ttl {
    /// A TTL of the given number of seconds.
    #[must_use]
    pub const fn secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// A TTL of the given number of minutes.
    #[must_use]
    pub const fn minutes(minutes: u64) -> Self {
        Self::After(Duration::from_secs(minutes * 60))
    }

    /// Returns `true` for [`Ttl::Infinite`].
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}

/// A cached value with its write timestamp, TTL, and revision.
///
/// Entries are replaced whole on every write; there is no partial update.
/// The `revision` is a monotonic per-cache write counter that lets callers
/// detect change without comparing payloads.
///
/// # Examples
///
/// ```
/// use larder_store::{CacheEntry, Ttl};
/// use std::time::{Duration, SystemTime};
///
/// let written = SystemTime::UNIX_EPOCH;
/// let entry = CacheEntry::new(42, written, Ttl::secs(60));
///
/// assert!(!entry.is_expired(written + Duration::from_secs(59)));
/// assert!(entry.is_expired(written + Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<T> {
    data: T,
    written_at: SystemTime,
    ttl: Ttl,
    revision: u64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry written at the given time with revision 0.
    pub fn new(data: T, written_at: SystemTime, ttl: Ttl) -> Self {
        Self {
            data,
            written_at,
            ttl,
            revision: 0,
        }
    }

    /// Sets the revision, typically the cache's next write-counter value.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the entry and returns the inner value.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }

    /// Returns the time this entry was written.
    #[must_use]
    pub fn written_at(&self) -> SystemTime {
        self.written_at
    }

    /// Returns the entry's TTL.
    #[must_use]
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Returns the entry's revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the entry's age at `now`, zero if `written_at` is in the future.
    #[must_use]
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.written_at).unwrap_or_default()
    }

    /// Returns `true` once the entry's age has reached a finite TTL.
    ///
    /// Infinite entries never expire. A `written_at` in the future (clock
    /// skew) counts as not expired.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.ttl {
            Ttl::Infinite => false,
            Ttl::After(ttl) => match now.duration_since(self.written_at) {
                Ok(age) => age >= ttl,
                Err(_) => false,
            },
        }
    }
}

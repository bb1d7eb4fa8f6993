// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

#[cfg(feature = "test-util")]
use std::{sync::Arc, time::Duration};

/// Provides the cache's view of wall-clock time.
///
/// In production the clock reads the system time. With the `test-util`
/// feature enabled, [`Clock::new_frozen`] creates a clock that only moves
/// when [`Clock::advance`] is called, which makes TTL behavior fast and
/// deterministic to test.
///
/// Cloning a clock is cheap, and every clone of a frozen clock shares the
/// same controlled state: advancing one advances them all.
///
/// # Examples
///
/// ```
/// use larder_store::Clock;
///
/// let clock = Clock::new();
/// let earlier = clock.now();
/// assert!(clock.now() >= earlier);
/// ```
#[derive(Clone, Debug)]
pub struct Clock {
    inner: ClockInner,
}

#[derive(Clone, Debug)]
enum ClockInner {
    System,
    #[cfg(feature = "test-util")]
    Controlled(Arc<parking_lot::Mutex<SystemTime>>),
}

impl Clock {
    /// Creates a clock that reads the system time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: ClockInner::System,
        }
    }

    /// Returns the current time according to this clock.
    #[must_use]
    pub fn now(&self) -> SystemTime {
        match &self.inner {
            ClockInner::System => SystemTime::now(),
            #[cfg(feature = "test-util")]
            ClockInner::Controlled(state) => *state.lock(),
        }
    }

    /// Creates a clock frozen at the UNIX epoch.
    ///
    /// Time only passes through [`Clock::advance`].
    #[cfg(feature = "test-util")]
    #[must_use]
    pub fn new_frozen() -> Self {
        Self::new_frozen_at(SystemTime::UNIX_EPOCH)
    }

    /// Creates a clock frozen at the given time.
    #[cfg(feature = "test-util")]
    #[must_use]
    pub fn new_frozen_at(time: SystemTime) -> Self {
        Self {
            inner: ClockInner::Controlled(Arc::new(parking_lot::Mutex::new(time))),
        }
    }

    /// Moves a frozen clock forward by `by`.
    ///
    /// # Panics
    ///
    /// Panics when called on a system clock.
    #[cfg(feature = "test-util")]
    pub fn advance(&self, by: Duration) {
        match &self.inner {
            ClockInner::System => panic!("Clock::advance requires a clock created with new_frozen"),
            ClockInner::Controlled(state) => {
                let mut now = state.lock();
                *now += by;
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

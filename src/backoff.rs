/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Persists "server is in backoff until T" and is consulted before every
//! request (spec.md §4.B).

use std::sync::atomic::{AtomicU64, Ordering};

const NO_BACKOFF: u64 = 0;

/// Shared, thread-safe backoff window. A `0` sentinel means "no backoff in
/// effect"; real timestamps are always > 0 (ms since epoch).
#[derive(Debug, Default)]
pub struct BackoffStore {
    until_local_millis: AtomicU64,
}

impl BackoffStore {
    pub fn new() -> Self {
        BackoffStore {
            until_local_millis: AtomicU64::new(NO_BACKOFF),
        }
    }

    /// Records that the server asked us to wait until `until_millis`.
    pub fn set_until(&self, until_millis: u64) {
        self.until_local_millis.store(until_millis, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.until_local_millis.store(NO_BACKOFF, Ordering::SeqCst);
    }

    /// Returns `Some(until)` iff a backoff window is set and `now` hasn't
    /// reached it yet.
    pub fn check(&self, now_millis: u64) -> Option<u64> {
        let until = self.until_local_millis.load(Ordering::SeqCst);
        if until != NO_BACKOFF && until > now_millis {
            Some(until)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backoff_by_default() {
        let store = BackoffStore::new();
        assert_eq!(store.check(1_000), None);
    }

    #[test]
    fn test_backoff_window() {
        let store = BackoffStore::new();
        store.set_until(10_000);
        assert_eq!(store.check(5_000), Some(10_000));
        assert_eq!(store.check(10_000), None);
        assert_eq!(store.check(10_001), None);
    }

    #[test]
    fn test_clear() {
        let store = BackoffStore::new();
        store.set_until(10_000);
        store.clear();
        assert_eq!(store.check(0), None);
    }
}

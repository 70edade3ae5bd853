//! Sliding-window request counter with per-key locking.
//!
//! [`SlidingWindowLimiter`] keeps, for every caller key, the timestamps of
//! the requests admitted within the current window. Each key's record sits
//! behind its own mutex inside a sharded [`DashMap`], so the
//! prune → check → record sequence is atomic per key while different keys
//! proceed in parallel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Timestamps admitted for one key, oldest first.
#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request was admitted (and recorded).
    pub admitted: bool,
    /// Configured limit for this check.
    pub limit: usize,
    /// Configured window for this check.
    pub window: Duration,
    /// Requests still available in the current window after this check.
    pub remaining: usize,
    /// Time until a slot frees up. Zero when admitted.
    pub retry_after: Duration,
}

/// Per-key sliding-window limiter.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, Arc<Mutex<Window>>>,
}

impl SlidingWindowLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits or rejects one request for `key`.
    ///
    /// Returns `true` and records the request when fewer than `limit`
    /// requests were admitted within the last `window`.
    pub fn admit(&self, key: &str, limit: usize, window: Duration) -> bool {
        self.check(key, limit, window).admitted
    }

    /// Like [`Self::admit`] but returns the full [`Admission`] decision.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> Admission {
        self.check_at(key, limit, window, Instant::now())
    }

    /// Performs the admission check as of `now`.
    pub fn check_at(&self, key: &str, limit: usize, window: Duration, now: Instant) -> Admission {
        let slot = self.slot(key);
        let mut record = slot.lock();
        record.prune(now, window);

        let count = record.hits.len();
        if count < limit {
            record.hits.push_back(now);
            return Admission {
                admitted: true,
                limit,
                window,
                remaining: limit - count - 1,
                retry_after: Duration::ZERO,
            };
        }

        let retry_after = record
            .hits
            .front()
            .map_or(window, |oldest| {
                window.saturating_sub(now.saturating_duration_since(*oldest))
            });
        Admission {
            admitted: false,
            limit,
            window,
            remaining: 0,
            retry_after,
        }
    }

    /// Number of requests currently recorded for `key` within `window`.
    #[must_use]
    pub fn recorded(&self, key: &str, window: Duration) -> usize {
        let Some(slot) = self.windows.get(key).map(|s| Arc::clone(s.value())) else {
            return 0;
        };
        let mut record = slot.lock();
        record.prune(Instant::now(), window);
        record.hits.len()
    }

    /// Drops records that hold no timestamp within `window`.
    ///
    /// A record is only removed when no concurrent check holds it, so an
    /// in-progress admission is never lost. Returns the number removed.
    pub fn sweep(&self, window: Duration) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let mut record = slot.lock();
            record.prune(now, window);
            !record.hits.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Window>> {
        if let Some(slot) = self.windows.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.windows.entry(key.to_string()).or_default().value())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = SlidingWindowLimiter::new();
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("ip:1.2.3.4", 3, MINUTE, now).admitted);
        }
        let rejected = limiter.check_at("ip:1.2.3.4", 3, MINUTE, now);
        assert!(!rejected.admitted);
        assert_eq!(rejected.limit, 3);
        assert_eq!(rejected.window, MINUTE);
        assert_eq!(rejected.retry_after, MINUTE);
    }

    #[test]
    fn rejection_does_not_extend_record() {
        let limiter = SlidingWindowLimiter::new();
        let now = Instant::now();
        assert!(limiter.check_at("k", 1, MINUTE, now).admitted);
        for _ in 0..10 {
            assert!(!limiter.check_at("k", 1, MINUTE, now).admitted);
        }
        assert_eq!(limiter.recorded("k", MINUTE), 1);
    }

    #[test]
    fn window_slides() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();
        assert!(limiter.check_at("k", 2, MINUTE, start).admitted);
        let later = start + Duration::from_secs(30);
        assert!(limiter.check_at("k", 2, MINUTE, later).admitted);
        assert!(!limiter.check_at("k", 2, MINUTE, later).admitted);

        // First hit leaves the window; one slot frees up.
        let after_first = start + MINUTE;
        assert!(limiter.check_at("k", 2, MINUTE, after_first).admitted);
        assert!(!limiter.check_at("k", 2, MINUTE, after_first).admitted);
    }

    #[test]
    fn retry_after_counts_down_to_oldest_expiry() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();
        let _ = limiter.check_at("k", 1, MINUTE, start);
        let decision = limiter.check_at("k", 1, MINUTE, start + Duration::from_secs(45));
        assert!(!decision.admitted);
        assert_eq!(decision.retry_after, Duration::from_secs(15));
    }

    #[test]
    fn remaining_decrements() {
        let limiter = SlidingWindowLimiter::new();
        let now = Instant::now();
        assert_eq!(limiter.check_at("k", 3, MINUTE, now).remaining, 2);
        assert_eq!(limiter.check_at("k", 3, MINUTE, now).remaining, 1);
        assert_eq!(limiter.check_at("k", 3, MINUTE, now).remaining, 0);
    }

    #[test]
    fn zero_limit_always_rejects() {
        let limiter = SlidingWindowLimiter::new();
        assert!(!limiter.admit("k", 0, MINUTE));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new();
        assert!(limiter.admit("a", 1, MINUTE));
        assert!(!limiter.admit("a", 1, MINUTE));
        assert!(limiter.admit("b", 1, MINUTE));
    }

    #[test]
    fn admits_again_after_real_window_elapses() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_millis(40);
        assert!(limiter.admit("k", 1, window));
        assert!(!limiter.admit("k", 1, window));
        std::thread::sleep(window + Duration::from_millis(10));
        assert!(limiter.admit("k", 1, window));
    }

    #[test]
    fn sweep_drops_only_expired_records() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_millis(20);
        let _ = limiter.admit("old", 5, window);
        std::thread::sleep(Duration::from_millis(30));
        let _ = limiter.admit("fresh", 5, window);

        let removed = limiter.sweep(window);
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.recorded("fresh", window), 1);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(SlidingWindowLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.admit("shared", 100, MINUTE)).count()
                })
            })
            .collect();
        let admitted: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .sum();
        assert_eq!(admitted, 100);
        assert_eq!(limiter.recorded("shared", MINUTE), 100);
    }

    #[test]
    fn concurrent_identities_do_not_interfere() {
        let limiter = Arc::new(SlidingWindowLimiter::new());
        let handles: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|key| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..30).filter(|_| limiter.admit(key, 20, MINUTE)).count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap_or_default(), 20);
        }
        assert_eq!(limiter.recorded("alice", MINUTE), 20);
        assert_eq!(limiter.recorded("bob", MINUTE), 20);
    }
}

//! Lock-free session statistics.
//!
//! Counters are plain atomics. The running lifetime total and the number of
//! sessions it covers must change together, so they live in one immutable
//! tuple that is replaced with compare-and-swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::SessionMetadata;

#[derive(Debug, Clone, Copy, Default)]
struct LifetimeTotals {
    total: Duration,
    count: u64,
}

/// Per-manager statistics, updated concurrently from request and
/// expiration threads.
pub struct SessionStatistics {
    created: AtomicU64,
    active: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
    /// Nanoseconds; `u64` covers lifetimes of several centuries.
    max_lifetime_ns: AtomicU64,
    totals: ArcSwap<LifetimeTotals>,
}

/// Point-in-time copy of [`SessionStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub created: u64,
    pub active: u64,
    pub rejected: u64,
    pub expired: u64,
    /// Sessions whose lifetime has been recorded.
    pub ended: u64,
    pub mean_lifetime: Duration,
    pub max_lifetime: Duration,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self {
            created: AtomicU64::new(0),
            active: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            max_lifetime_ns: AtomicU64::new(0),
            totals: ArcSwap::from_pointee(LifetimeTotals::default()),
        }
    }

    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a session's life on this node.
    pub fn record(&self, metadata: &SessionMetadata) {
        self.record_at(metadata, Utc::now());
    }

    pub fn record_at(&self, metadata: &SessionMetadata, now: DateTime<Utc>) {
        let lifetime = metadata.lifetime_at(now);
        let lifetime_ns = u64::try_from(lifetime.as_nanos()).unwrap_or(u64::MAX);

        self.max_lifetime_ns.fetch_max(lifetime_ns, Ordering::AcqRel);

        // rcu retries the swap until no concurrent update slipped in between.
        self.totals.rcu(|current| {
            Arc::new(LifetimeTotals {
                total: current.total.saturating_add(lifetime),
                count: current.count + 1,
            })
        });

        if metadata.is_expired_at(now) {
            self.expired.fetch_add(1, Ordering::Relaxed);
        }

        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Sessions created and not yet ended on this node.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_nanos(self.max_lifetime_ns.load(Ordering::Acquire))
    }

    /// Mean lifetime of recorded sessions; zero when none were recorded.
    pub fn mean_lifetime(&self) -> Duration {
        let totals = self.totals.load();
        if totals.count == 0 {
            return Duration::ZERO;
        }
        let nanos = totals.total.as_nanos() / u128::from(totals.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            created: self.created(),
            active: self.active(),
            rejected: self.rejected(),
            expired: self.expired(),
            ended: self.totals.load().count,
            mean_lifetime: self.mean_lifetime(),
            max_lifetime: self.max_lifetime(),
        }
    }

    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.active.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.expired.store(0, Ordering::Relaxed);
        self.max_lifetime_ns.store(0, Ordering::Release);
        self.totals.store(Arc::new(LifetimeTotals::default()));
    }
}

impl Default for SessionStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::thread;

    fn ended(now: DateTime<Utc>, lifetime_ms: i64, expired: bool) -> SessionMetadata {
        ended_after(now, TimeDelta::milliseconds(lifetime_ms), expired)
    }

    fn ended_after(now: DateTime<Utc>, lifetime: TimeDelta, expired: bool) -> SessionMetadata {
        let created = now - lifetime;
        let mut metadata = SessionMetadata::new(created, Duration::from_millis(1));
        metadata.last_access_end = if expired {
            now - TimeDelta::milliseconds(5)
        } else {
            now
        };
        metadata
    }

    #[test]
    fn test_empty() {
        let stats = SessionStatistics::new();
        assert_eq!(stats.mean_lifetime(), Duration::ZERO);
        assert_eq!(stats.max_lifetime(), Duration::ZERO);
        assert_eq!(stats.snapshot().ended, 0);
    }

    #[test]
    fn test_record() {
        let stats = SessionStatistics::new();
        let now = Utc::now();
        stats.record_created();
        stats.record_created();
        stats.record_at(&ended(now, 1000, false), now);
        stats.record_at(&ended(now, 3000, true), now);

        let snap = stats.snapshot();
        assert_eq!(snap.created, 2);
        assert_eq!(snap.active, 0);
        assert_eq!(snap.expired, 1);
        assert_eq!(snap.ended, 2);
        assert_eq!(snap.mean_lifetime, Duration::from_millis(2000));
        assert_eq!(snap.max_lifetime, Duration::from_millis(3000));
    }

    #[test]
    fn test_sub_millisecond_lifetimes_keep_precision() {
        let stats = SessionStatistics::new();
        let now = Utc::now();
        stats.record_at(&ended_after(now, TimeDelta::microseconds(1900), false), now);

        assert_eq!(stats.max_lifetime(), Duration::from_micros(1900));
        assert_eq!(stats.mean_lifetime(), Duration::from_micros(1900));

        stats.record_at(&ended_after(now, TimeDelta::microseconds(100), false), now);
        assert_eq!(stats.max_lifetime(), Duration::from_micros(1900));
        assert_eq!(stats.mean_lifetime(), Duration::from_micros(1000));
        assert!(stats.max_lifetime() >= stats.mean_lifetime());
    }

    #[test]
    fn test_active_never_underflows() {
        let stats = SessionStatistics::new();
        let now = Utc::now();
        stats.record_at(&ended(now, 10, false), now);
        assert_eq!(stats.active(), 0);
    }

    #[test]
    fn test_reset() {
        let stats = SessionStatistics::new();
        let now = Utc::now();
        stats.record_created();
        stats.record_rejected();
        stats.record_at(&ended(now, 500, true), now);
        stats.reset();
        assert_eq!(
            stats.snapshot(),
            StatisticsSnapshot {
                created: 0,
                active: 0,
                rejected: 0,
                expired: 0,
                ended: 0,
                mean_lifetime: Duration::ZERO,
                max_lifetime: Duration::ZERO,
            }
        );
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let stats = Arc::new(SessionStatistics::new());
        let now = Utc::now();
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        let lifetime = (t * per_thread + i) as i64;
                        stats.record_at(&ended(now, lifetime, i % 2 == 0), now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let n = (threads * per_thread) as u64;
        let snap = stats.snapshot();
        assert_eq!(snap.ended, n);
        assert_eq!(snap.expired, n / 2);
        assert_eq!(snap.max_lifetime, Duration::from_millis(n - 1));
        // Sum of 0..n ms divided by n.
        let total_ms = n * (n - 1) / 2;
        assert_eq!(
            snap.mean_lifetime,
            Duration::from_nanos(total_ms * 1_000_000 / n)
        );
    }
}

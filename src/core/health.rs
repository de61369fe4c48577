use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Consecutive transport failures observed against one backend address.
#[derive(Debug)]
struct FailureRecord {
    failures: u32,
    expires_at: Instant,
}

/// Passive per-backend health, keyed by `ip:port`.
///
/// Failures are recorded by the proxy loop; a backend is considered
/// unhealthy once its consecutive-failure count reaches the threshold.
/// Records expire after a TTL so a backend that stops receiving traffic
/// is forgiven, and any successful attempt clears its record outright.
#[derive(Debug)]
pub struct PassiveHealthStore {
    entries: DashMap<String, FailureRecord>,
    threshold: u32,
    ttl: Duration,
}

impl PassiveHealthStore {
    pub fn new(threshold: u32, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            threshold,
            ttl,
        }
    }

    /// Record one failed attempt and return the updated count. The increment
    /// happens under the entry lock, so concurrent failures are never lost.
    pub fn mark_failed(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut record = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| FailureRecord {
                failures: 0,
                expires_at: now + self.ttl,
            });
        if record.expires_at <= now {
            record.failures = 0;
        }
        record.failures += 1;
        record.expires_at = now + self.ttl;
        record.failures
    }

    /// A successful attempt clears the backend's record entirely.
    pub fn mark_healthy(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn is_unhealthy(&self, key: &str) -> bool {
        self.failure_count(key) >= self.threshold
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        match self.entries.get(key) {
            Some(record) if record.expires_at > Instant::now() => record.failures,
            _ => 0,
        }
    }

    /// Drop expired records; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

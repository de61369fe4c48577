use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::core::route::Route;

#[derive(Debug, Clone)]
struct CacheEntry {
    routes: Vec<Route>,
    expires_at: Instant,
}

/// Per-tenant route cache with absolute expiry checked on read.
///
/// Entries land after a successful resolution and age out on their own;
/// there is no invalidation API. Size is bounded by evicting the entry
/// closest to expiry once the cap is reached, and a periodic sweep clears
/// anything already expired.
#[derive(Debug)]
pub struct RouteCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl RouteCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Returns the cached routes for a tenant if the entry is still live.
    pub fn get(&self, tenant: &str) -> Option<Vec<Route>> {
        let entry = self.entries.get(tenant)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.routes.clone())
    }

    /// Insert routes for a tenant with the default TTL, or a per-entry
    /// override when the resolution carried one.
    pub fn insert(&self, tenant: &str, routes: Vec<Route>, ttl_override: Option<Duration>) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(tenant) {
            self.evict_one();
        }
        let ttl = ttl_override.unwrap_or(self.ttl);
        self.entries.insert(
            tenant.to_string(),
            CacheEntry {
                routes,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Evict the entry closest to expiry. Expired entries sort first, so
    /// this prefers reclaiming dead weight over live routes.
    fn evict_one(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use dashmap::DashMap;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Request ids whose shipment could not be found, suppressed from lookup
/// until their entry expires.
///
/// Losing an entry only costs one extra lookup; the scheduler re-derives
/// everything from the stores each tick.
pub trait TombstoneStore: Send + Sync {
    /// Records a failed lookup. Returns `true` on the first sighting.
    fn mark(&self, id: Uuid) -> bool;
    /// True while `id` should be skipped.
    fn is_suppressed(&self, id: Uuid) -> bool;
    /// Drops `id` after a successful resolution.
    fn clear(&self, id: Uuid);
    fn clear_all(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub hits: u32,
}

/// In-memory [`TombstoneStore`] with TTL expiry and a capacity bound.
#[derive(Debug, Clone)]
pub struct TombstoneCache {
    entries: Arc<DashMap<Uuid, Tombstone>>,
    ttl: Duration,
    capacity: usize,
}

impl TombstoneCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Tombstone> {
        self.entries.get(&id).map(|e| *e.value())
    }

    pub fn mark_at(&self, id: Uuid, now: Instant) -> bool {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            if now.saturating_duration_since(entry.first_seen) < self.ttl {
                entry.last_seen = now;
                entry.hits = entry.hits.saturating_add(1);
                return false;
            }
        }

        if !self.entries.contains_key(&id) && self.entries.len() >= self.capacity {
            self.evict_expired(now);
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            id,
            Tombstone {
                first_seen: now,
                last_seen: now,
                hits: 1,
            },
        );
        counter!("stock_transfer.tombstones.marked", 1);
        gauge!("stock_transfer.tombstones.size", self.entries.len() as f64);
        true
    }

    pub fn is_suppressed_at(&self, id: Uuid, now: Instant) -> bool {
        let expired = match self.entries.get(&id) {
            None => return false,
            Some(entry) => now.saturating_duration_since(entry.first_seen) >= self.ttl,
        };
        if expired {
            self.entries.remove(&id);
            debug!(request_id = %id, "tombstone expired; lookup will be retried");
            return false;
        }
        true
    }

    /// Removes every entry older than the TTL. Returns how many were dropped.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.first_seen) < self.ttl);
        before - self.entries.len()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().first_seen)
            .map(|e| *e.key());
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }
}

impl TombstoneStore for TombstoneCache {
    fn mark(&self, id: Uuid) -> bool {
        self.mark_at(id, Instant::now())
    }

    fn is_suppressed(&self, id: Uuid) -> bool {
        self.is_suppressed_at(id, Instant::now())
    }

    fn clear(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    fn clear_all(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_reports_new_entry() {
        let cache = TombstoneCache::new(Duration::from_secs(60), 10);
        let id = Uuid::new_v4();
        let now = Instant::now();

        assert!(cache.mark_at(id, now));
        assert!(!cache.mark_at(id, now + Duration::from_secs(1)));
        assert!(cache.is_suppressed_at(id, now + Duration::from_secs(2)));

        let entry = cache.get(id).unwrap();
        assert_eq!(entry.hits, 2);
        assert_eq!(entry.first_seen, now);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TombstoneCache::new(Duration::from_secs(30), 10);
        let id = Uuid::new_v4();
        let now = Instant::now();
        cache.mark_at(id, now);

        assert!(cache.is_suppressed_at(id, now + Duration::from_secs(29)));
        assert!(!cache.is_suppressed_at(id, now + Duration::from_secs(30)));
        assert!(cache.is_empty());
    }

    #[test]
    fn remark_after_expiry_restarts_window() {
        let cache = TombstoneCache::new(Duration::from_secs(10), 10);
        let id = Uuid::new_v4();
        let now = Instant::now();
        cache.mark_at(id, now);

        let later = now + Duration::from_secs(15);
        assert!(cache.mark_at(id, later));
        assert_eq!(cache.get(id).unwrap().first_seen, later);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = TombstoneCache::new(Duration::from_secs(3600), 2);
        let now = Instant::now();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        cache.mark_at(a, now);
        cache.mark_at(b, now + Duration::from_secs(1));
        cache.mark_at(c, now + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn clear_is_always_safe() {
        let cache = TombstoneCache::new(Duration::from_secs(60), 10);
        let id = Uuid::new_v4();
        cache.clear(id);
        cache.mark(id);
        assert!(cache.is_suppressed(id));
        cache.clear(id);
        assert!(!cache.is_suppressed(id));

        cache.mark(Uuid::new_v4());
        cache.clear_all();
        assert!(cache.is_empty());
    }
}

// Shared booking registry: which offer URLs each user currently holds.
//
// The registry is the only state shared across booking workers. Entries are
// created lazily; get-or-create and mutation happen as one atomic step under
// the map's shard lock, so concurrent workers racing on the same user cannot
// lose updates.

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::RwLock;

#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    pub holds_added: usize,
    pub holds_released: usize,
    /// Releases of holds that were already gone. Harmless: compensation is
    /// idempotent.
    pub release_misses: usize,
}

#[derive(Debug, Default)]
pub struct BookingRegistry {
    holds: DashMap<u64, HashSet<String>>,
    stats: RwLock<RegistryStats>,
}

impl BookingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hold for `(user_id, url)`. Returns false if the hold was
    /// already present.
    pub fn hold(&self, user_id: u64, url: &str) -> bool {
        let inserted = self
            .holds
            .entry(user_id)
            .or_default()
            .insert(url.to_string());
        if inserted {
            self.stats.write().holds_added += 1;
        }
        inserted
    }

    /// Remove a hold. Removing an absent hold is a no-op, not an error.
    pub fn release(&self, user_id: u64, url: &str) -> bool {
        let removed = self
            .holds
            .get_mut(&user_id)
            .map(|mut set| set.remove(url))
            .unwrap_or(false);
        let mut stats = self.stats.write();
        if removed {
            stats.holds_released += 1;
        } else {
            stats.release_misses += 1;
        }
        removed
    }

    /// Snapshot of the URLs currently held for a user.
    pub fn holds_for(&self, user_id: u64) -> HashSet<String> {
        self.holds
            .get(&user_id)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    pub fn held_count(&self, user_id: u64) -> usize {
        self.holds.get(&user_id).map(|set| set.len()).unwrap_or(0)
    }

    /// Drop every hold, e.g. between test runs. The registry itself stays
    /// usable.
    pub fn clear(&self) {
        self.holds.clear();
        *self.stats.write() = RegistryStats::default();
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn hold_and_release() {
        let registry = BookingRegistry::new();
        assert!(registry.hold(1, "http://svcA/car?id=1"));
        assert!(!registry.hold(1, "http://svcA/car?id=1"));
        assert_eq!(registry.held_count(1), 1);

        assert!(registry.release(1, "http://svcA/car?id=1"));
        assert_eq!(registry.held_count(1), 0);
    }

    #[test]
    fn releasing_absent_hold_is_noop() {
        let registry = BookingRegistry::new();
        assert!(!registry.release(1, "http://svcA/car?id=1"));
        registry.hold(1, "http://svcA/car?id=1");
        assert!(registry.release(1, "http://svcA/car?id=1"));
        assert!(!registry.release(1, "http://svcA/car?id=1"));

        let stats = registry.stats();
        assert_eq!(stats.holds_added, 1);
        assert_eq!(stats.holds_released, 1);
        assert_eq!(stats.release_misses, 2);
    }

    #[tokio::test]
    async fn concurrent_holds_for_same_user_are_not_lost() {
        let registry = Arc::new(BookingRegistry::new());
        let mut handles = Vec::new();
        for i in 0..32u64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.hold(1, &format!("http://svcA/car?id={i}"));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.held_count(1), 32);
        assert_eq!(registry.stats().holds_added, 32);
    }

    #[test]
    fn clear_resets_everything() {
        let registry = BookingRegistry::new();
        registry.hold(1, "http://svcA/car?id=1");
        registry.hold(2, "http://svcB/car?id=2");
        registry.clear();
        assert_eq!(registry.held_count(1), 0);
        assert_eq!(registry.held_count(2), 0);
        assert_eq!(registry.stats().holds_added, 0);
    }
}

use std::collections::HashMap;
use std::net::IpAddr;
use tracing::warn;

/// Active-connection ledger: peer address → live connection count.
///
/// Not synchronized by itself; the admission controller owns one instance
/// behind its mutex so that the admission check and the increment are a
/// single critical section.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: HashMap<IpAddr, u32>,
    total: u32,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total: u32,
    pub unique_peers: usize,
    pub per_peer: HashMap<IpAddr, u32>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, peer: IpAddr) {
        *self.active.entry(peer).or_insert(0) += 1;
        self.total += 1;
    }

    /// Decrement the peer's count, dropping the entry at zero. Removing an
    /// untracked peer is a no-op; it indicates an unbalanced release and is
    /// logged as anomalous rather than allowed to underflow.
    pub fn remove(&mut self, peer: IpAddr) {
        match self.active.get_mut(&peer) {
            Some(count) => {
                *count -= 1;
                self.total -= 1;
                if *count == 0 {
                    self.active.remove(&peer);
                }
            }
            None => {
                warn!(ip = %peer, "Release for untracked peer ignored");
            }
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn count_for(&self, peer: IpAddr) -> u32 {
        self.active.get(&peer).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            total: self.total,
            unique_peers: self.active.len(),
            per_peer: self.active.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn add_and_remove_balance() {
        let mut registry = SessionRegistry::new();
        registry.add(ip(1));
        registry.add(ip(1));
        registry.add(ip(2));
        assert_eq!(registry.total(), 3);
        assert_eq!(registry.count_for(ip(1)), 2);

        registry.remove(ip(1));
        assert_eq!(registry.total(), 2);
        assert_eq!(registry.count_for(ip(1)), 1);
    }

    #[test]
    fn entry_removed_at_zero() {
        let mut registry = SessionRegistry::new();
        registry.add(ip(1));
        registry.remove(ip(1));
        assert_eq!(registry.total(), 0);
        assert_eq!(registry.snapshot().unique_peers, 0);
    }

    #[test]
    fn remove_untracked_is_noop() {
        let mut registry = SessionRegistry::new();
        registry.remove(ip(9));
        assert_eq!(registry.total(), 0);

        registry.add(ip(1));
        registry.remove(ip(9));
        assert_eq!(registry.total(), 1);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut registry = SessionRegistry::new();
        registry.add(ip(1));
        registry.add(ip(2));
        registry.add(ip(2));
        let stats = registry.snapshot();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique_peers, 2);
        assert_eq!(stats.per_peer[&ip(2)], 2);
    }
}

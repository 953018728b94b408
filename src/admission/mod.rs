pub mod registry;

use crate::config::types::AppConfig;
use registry::{RegistryStats, SessionRegistry};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Why a connection attempt was turned away. Never surfaced to the peer
/// beyond a closed socket; always surfaced to the audit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Blocked,
    NotAllowed,
    RateLimited,
    AtCapacity,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Blocked => "blocked ip",
            RejectReason::NotAllowed => "not on allowlist",
            RejectReason::RateLimited => "rate limited",
            RejectReason::AtCapacity => "at capacity",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable admission state. Everything the check-then-act sequence touches
/// lives behind one mutex so a burst from a single peer cannot slip between
/// the check and the registry increment.
struct AdmissionState {
    registry: SessionRegistry,
    windows: HashMap<IpAddr, VecDeque<Instant>>,
}

/// Decides, per incoming connection, whether to accept: block/allow lists,
/// a per-peer sliding-window rate limit, and the global concurrency cap.
///
/// `try_admit` reserves a registry slot on success; the caller must pair it
/// with exactly one `release` at session teardown.
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
    blocked: HashSet<IpAddr>,
    allowed: HashSet<IpAddr>,
    rate_limit_enabled: bool,
    max_per_ip: usize,
    window: Duration,
    max_total: u32,
}

impl AdmissionController {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                registry: SessionRegistry::new(),
                windows: HashMap::new(),
            }),
            blocked: config.security.blocked_ips.iter().copied().collect(),
            allowed: config.security.allowed_ips.iter().copied().collect(),
            rate_limit_enabled: config.security.rate_limit_enabled,
            max_per_ip: config.security.max_connections_per_ip as usize,
            window: Duration::from_secs(config.security.rate_limit_window),
            max_total: config.limits.max_connections,
        }
    }

    /// Run the full admission sequence for a peer and, on acceptance, record
    /// the connection in the registry. The whole sequence is one critical
    /// section.
    pub fn try_admit(&self, peer: IpAddr) -> Result<(), RejectReason> {
        self.try_admit_at(peer, Instant::now())
    }

    /// Admission with an explicit "now", so window aging is testable.
    pub fn try_admit_at(&self, peer: IpAddr, now: Instant) -> Result<(), RejectReason> {
        if self.blocked.contains(&peer) {
            return Err(RejectReason::Blocked);
        }
        if !self.allowed.is_empty() && !self.allowed.contains(&peer) {
            return Err(RejectReason::NotAllowed);
        }

        let mut state = self.state.lock().unwrap();

        if self.rate_limit_enabled {
            let window = state.windows.entry(peer).or_default();
            while let Some(&oldest) = window.front() {
                if now.duration_since(oldest) > self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            if window.len() >= self.max_per_ip {
                return Err(RejectReason::RateLimited);
            }
            window.push_back(now);
        }

        if state.registry.total() >= self.max_total {
            return Err(RejectReason::AtCapacity);
        }

        state.registry.add(peer);
        Ok(())
    }

    /// Release the registry slot reserved by a successful `try_admit`.
    pub fn release(&self, peer: IpAddr) {
        let mut state = self.state.lock().unwrap();
        state.registry.remove(peer);
        // The rate-limit window has its own lifecycle: entries age out, they
        // are not tied to the connection count.
        if let Some(window) = state.windows.get(&peer) {
            if window.is_empty() {
                state.windows.remove(&peer);
            }
        }
    }

    /// Drop rate-limit window entries older than the configured window.
    /// Called periodically so idle peers do not accumulate state forever.
    pub fn prune_windows(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state.windows.retain(|_, window| {
            while let Some(&oldest) = window.front() {
                if now.duration_since(oldest) > self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
    }

    pub fn active_count(&self) -> u32 {
        self.state.lock().unwrap().registry.total()
    }

    pub fn stats_snapshot(&self) -> RegistryStats {
        self.state.lock().unwrap().registry.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AppConfig;

    fn controller(max_per_ip: u32, window_secs: u64, max_total: u32) -> AdmissionController {
        let mut config = AppConfig::default();
        config.security.max_connections_per_ip = max_per_ip;
        config.security.rate_limit_window = window_secs;
        config.limits.max_connections = max_total;
        AdmissionController::new(&config)
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([198, 51, 100, last])
    }

    #[test]
    fn admits_within_rate_limit() {
        let admission = controller(3, 60, 100);
        for _ in 0..3 {
            assert!(admission.try_admit(ip(1)).is_ok());
        }
        assert_eq!(
            admission.try_admit(ip(1)),
            Err(RejectReason::RateLimited)
        );
    }

    #[test]
    fn rate_limit_recovers_when_window_ages_out() {
        let admission = controller(2, 60, 100);
        let start = Instant::now();
        assert!(admission.try_admit_at(ip(1), start).is_ok());
        assert!(admission.try_admit_at(ip(1), start).is_ok());
        assert_eq!(
            admission.try_admit_at(ip(1), start + Duration::from_secs(30)),
            Err(RejectReason::RateLimited)
        );
        // Both original timestamps have aged out after 61s.
        assert!(admission
            .try_admit_at(ip(1), start + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn rate_limit_is_per_peer() {
        let admission = controller(1, 60, 100);
        assert!(admission.try_admit(ip(1)).is_ok());
        assert!(admission.try_admit(ip(2)).is_ok());
        assert_eq!(admission.try_admit(ip(1)), Err(RejectReason::RateLimited));
    }

    #[test]
    fn blocked_ip_rejected_before_anything_else() {
        let mut config = AppConfig::default();
        config.security.blocked_ips = vec![ip(7)];
        let admission = AdmissionController::new(&config);
        assert_eq!(admission.try_admit(ip(7)), Err(RejectReason::Blocked));
        assert_eq!(admission.active_count(), 0);
    }

    #[test]
    fn allowlist_excludes_unlisted_peers() {
        let mut config = AppConfig::default();
        config.security.allowed_ips = vec![ip(1)];
        let admission = AdmissionController::new(&config);
        assert!(admission.try_admit(ip(1)).is_ok());
        assert_eq!(admission.try_admit(ip(2)), Err(RejectReason::NotAllowed));
    }

    #[test]
    fn empty_allowlist_admits_everyone() {
        let admission = controller(5, 60, 100);
        assert!(admission.try_admit(ip(1)).is_ok());
        assert!(admission.try_admit(ip(2)).is_ok());
    }

    #[test]
    fn global_capacity_enforced() {
        let admission = controller(10, 60, 2);
        assert!(admission.try_admit(ip(1)).is_ok());
        assert!(admission.try_admit(ip(2)).is_ok());
        assert_eq!(admission.try_admit(ip(3)), Err(RejectReason::AtCapacity));

        admission.release(ip(1));
        // Slot freed; the window still counts the earlier attempt, but peer 3
        // has head-room in both dimensions.
        assert!(admission.try_admit(ip(3)).is_ok());
    }

    #[test]
    fn release_is_balanced() {
        let admission = controller(10, 60, 100);
        admission.try_admit(ip(1)).unwrap();
        admission.try_admit(ip(1)).unwrap();
        assert_eq!(admission.active_count(), 2);
        admission.release(ip(1));
        admission.release(ip(1));
        assert_eq!(admission.active_count(), 0);
        // Unbalanced release stays a no-op.
        admission.release(ip(1));
        assert_eq!(admission.active_count(), 0);
    }

    #[test]
    fn disabled_rate_limit_only_caps_capacity() {
        let mut config = AppConfig::default();
        config.security.rate_limit_enabled = false;
        config.limits.max_connections = 50;
        let admission = AdmissionController::new(&config);
        for _ in 0..50 {
            assert!(admission.try_admit(ip(1)).is_ok());
        }
        assert_eq!(admission.try_admit(ip(1)), Err(RejectReason::AtCapacity));
    }

    #[test]
    fn prune_windows_clears_idle_peers() {
        let admission = controller(5, 0, 100);
        admission.try_admit(ip(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        admission.prune_windows();
        let state = admission.state.lock().unwrap();
        assert!(state.windows.is_empty());
    }

    #[test]
    fn stats_snapshot_counts_peers() {
        let admission = controller(5, 60, 100);
        admission.try_admit(ip(1)).unwrap();
        admission.try_admit(ip(1)).unwrap();
        admission.try_admit(ip(2)).unwrap();
        let stats = admission.stats_snapshot();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique_peers, 2);
        assert_eq!(stats.per_peer[&ip(1)], 2);
    }
}

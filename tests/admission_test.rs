use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tarpot::admission::{AdmissionController, RejectReason};
use tarpot::config::types::AppConfig;

fn controller(max_per_ip: u32, window_secs: u64, max_total: u32) -> AdmissionController {
    let mut config = AppConfig::default();
    config.security.max_connections_per_ip = max_per_ip;
    config.security.rate_limit_window = window_secs;
    config.limits.max_connections = max_total;
    AdmissionController::new(&config)
}

fn ip(last: u8) -> IpAddr {
    IpAddr::from([192, 0, 2, last])
}

#[test]
fn exactly_first_m_of_n_attempts_admitted() {
    let m = 5;
    let n = 20;
    let admission = controller(m, 60, 1000);
    let now = Instant::now();

    let mut admitted = 0;
    for i in 0..n {
        match admission.try_admit_at(ip(1), now + Duration::from_millis(i)) {
            Ok(()) => admitted += 1,
            Err(reason) => assert_eq!(reason, RejectReason::RateLimited),
        }
    }
    assert_eq!(admitted, m);

    // Rejections continue until the earliest timestamp ages out of the window.
    assert!(admission
        .try_admit_at(ip(1), now + Duration::from_secs(59))
        .is_err());
    assert!(admission
        .try_admit_at(ip(1), now + Duration::from_secs(61))
        .is_ok());
}

#[test]
fn window_recovery_is_incremental() {
    // Two connections spaced 30s apart: after the first ages out there is
    // room for exactly one more, not two.
    let admission = controller(2, 60, 1000);
    let start = Instant::now();
    admission.try_admit_at(ip(2), start).unwrap();
    admission
        .try_admit_at(ip(2), start + Duration::from_secs(30))
        .unwrap();

    let after_first_expiry = start + Duration::from_secs(61);
    assert!(admission.try_admit_at(ip(2), after_first_expiry).is_ok());
    assert_eq!(
        admission.try_admit_at(ip(2), after_first_expiry),
        Err(RejectReason::RateLimited)
    );
}

#[tokio::test]
async fn global_cap_holds_under_concurrent_connects() {
    let cap = 10u32;
    let mut config = AppConfig::default();
    config.security.max_connections_per_ip = 1000;
    config.limits.max_connections = cap;
    let admission = Arc::new(AdmissionController::new(&config));

    let mut handles = Vec::new();
    for i in 0..100u8 {
        let admission = admission.clone();
        handles.push(tokio::spawn(async move {
            admission.try_admit(ip(i)).is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, cap);
    assert_eq!(admission.active_count(), cap);
    assert!(admission.stats_snapshot().total <= cap);
}

#[tokio::test]
async fn cap_invariant_survives_connect_disconnect_interleaving() {
    let cap = 8u32;
    let mut config = AppConfig::default();
    config.security.max_connections_per_ip = 10_000;
    config.limits.max_connections = cap;
    let admission = Arc::new(AdmissionController::new(&config));

    let mut handles = Vec::new();
    for i in 0..40u8 {
        let admission = admission.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                if admission.try_admit(ip(i % 16)).is_ok() {
                    // The sum of per-peer counts must never exceed the cap,
                    // observed from inside a live session.
                    assert!(admission.stats_snapshot().total <= cap);
                    tokio::task::yield_now().await;
                    admission.release(ip(i % 16));
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(admission.active_count(), 0);
}

#[test]
fn blocklist_beats_rate_limit_and_capacity() {
    let mut config = AppConfig::default();
    config.security.blocked_ips = vec![ip(66)];
    let admission = AdmissionController::new(&config);
    for _ in 0..10 {
        assert_eq!(admission.try_admit(ip(66)), Err(RejectReason::Blocked));
    }
    assert_eq!(admission.active_count(), 0);
}

#[test]
fn allowlist_restricts_admission() {
    let mut config = AppConfig::default();
    config.security.allowed_ips = vec![ip(1), ip(2)];
    let admission = AdmissionController::new(&config);
    assert!(admission.try_admit(ip(1)).is_ok());
    assert!(admission.try_admit(ip(2)).is_ok());
    assert_eq!(admission.try_admit(ip(3)), Err(RejectReason::NotAllowed));
}

#[test]
fn reject_reasons_render_for_audit() {
    assert_eq!(RejectReason::Blocked.as_str(), "blocked ip");
    assert_eq!(RejectReason::NotAllowed.as_str(), "not on allowlist");
    assert_eq!(RejectReason::RateLimited.as_str(), "rate limited");
    assert_eq!(RejectReason::AtCapacity.as_str(), "at capacity");
}

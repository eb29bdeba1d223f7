//! Circuit breaker state machine tests

use mesh_domain::CircuitState;
use mesh_infrastructure::config::CircuitBreakerConfig;
use mesh_infrastructure::resilience::{CircuitBreaker, CircuitBreakerRegistry};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn config(failures: u32, successes: u32, recovery: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .with_failure_threshold(failures)
        .with_success_threshold(successes)
        .with_recovery_timeout(recovery)
}

#[test]
fn test_full_cycle_closed_open_half_open_closed() {
    let breaker = CircuitBreaker::new("pricing", config(3, 2, Duration::from_millis(30)));
    assert!(breaker.can_execute());

    assert!(breaker.record_failure().is_none());
    assert!(breaker.record_failure().is_none());
    let opened = breaker.record_failure().expect("third failure opens");
    assert_eq!((opened.from, opened.to), (CircuitState::Closed, CircuitState::Open));
    assert!(!breaker.can_execute());

    thread::sleep(Duration::from_millis(40));
    let probe = breaker.admit();
    assert!(probe.permitted);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    assert!(breaker.record_success().is_none());
    assert!(breaker.admit().permitted, "next probe admitted after a success");
    let closed = breaker.record_success().expect("second success closes");
    assert_eq!(closed.to, CircuitState::Closed);
    assert_eq!(breaker.snapshot().failure_count, 0);
}

#[test]
fn test_half_open_failure_reopens_and_restarts_timer() {
    let breaker = CircuitBreaker::new("svc", config(1, 1, Duration::from_millis(40)));
    let _ = breaker.record_failure();
    thread::sleep(Duration::from_millis(50));
    assert!(breaker.admit().permitted);

    let reopened = breaker.record_failure().expect("reopens");
    assert_eq!(
        (reopened.from, reopened.to),
        (CircuitState::HalfOpen, CircuitState::Open)
    );
    thread::sleep(Duration::from_millis(15));
    assert!(!breaker.can_execute(), "recovery timer restarted");
}

#[test]
fn test_reset_forces_closed() {
    let breaker = CircuitBreaker::new("svc", config(1, 1, Duration::from_secs(60)));
    let _ = breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    let transition = breaker.reset().expect("was open");
    assert_eq!(transition.to, CircuitState::Closed);
    assert!(breaker.can_execute());
    assert!(breaker.reset().is_none(), "already closed");
}

#[test]
fn test_concurrent_failures_are_not_lost() {
    let breaker = Arc::new(CircuitBreaker::new(
        "svc",
        config(1000, 1, Duration::from_secs(60)),
    ));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            thread::spawn(move || {
                for _ in 0..100 {
                    let _ = breaker.record_failure();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.failure_count, 800);
    assert_eq!(snapshot.state, CircuitState::Closed);
}

#[test]
fn test_registry_holds_one_breaker_per_service() {
    let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
    let first = registry.get_or_create("b");
    let second = registry.get_or_create("b");
    assert!(Arc::ptr_eq(&first, &second));

    registry.get_or_create("a");
    let ids: Vec<_> = registry
        .snapshots()
        .into_iter()
        .map(|s| s.service_id)
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    assert!(registry.remove("b").is_some());
    assert!(registry.get("b").is_none());
    assert_eq!(registry.len(), 1);
}

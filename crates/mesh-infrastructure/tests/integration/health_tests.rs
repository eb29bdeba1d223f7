//! Health monitor tests against a scripted backend

use super::support::{HarnessBuilder, service};
use mesh_domain::{CircuitState, Error, HealthStatus, MeshEventKind, ServiceRequest};
use mesh_infrastructure::config::{CircuitBreakerConfig, HealthConfig};
use mesh_infrastructure::transport::{ScriptedReply, ScriptedTransport};
use serde_json::json;
use std::time::Duration;

fn fast_probes() -> HealthConfig {
    HealthConfig {
        probe_timeout_ms: 100,
        degraded_threshold_ms: 50,
        feed_circuit_breaker: true,
    }
}

#[tokio::test]
async fn test_status_is_unknown_before_first_sweep() {
    let h = HarnessBuilder::new(ScriptedTransport::new()).build();
    let monitor = h.health_monitor(fast_probes());
    h.registry.register(service("svc", &[1])).expect("register");

    assert_eq!(monitor.status("svc").expect("status"), HealthStatus::Unknown);
    assert!(matches!(
        monitor.status("ghost"),
        Err(Error::ServiceNotFound { .. })
    ));
    assert!(monitor.record("svc").is_none());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_failing_endpoint_degrades_service_and_leaves_rotation() {
    let transport =
        ScriptedTransport::new().with_reply("10.0.0.1:8081", ScriptedReply::status(503));
    let h = HarnessBuilder::new(transport).build();
    let monitor = h.health_monitor(fast_probes());
    h.registry
        .register(service("svc", &[8080, 8081]))
        .expect("register");

    let status = monitor.check_service("svc").await.expect("check");
    assert_eq!(status, HealthStatus::Degraded);
    assert_eq!(h.transport.calls_to("/health"), 2);

    for _ in 0..4 {
        let lease = h.registry.resolve("svc").expect("resolve");
        assert_eq!(lease.endpoint().address(), "10.0.0.1:8080");
    }

    let changes: Vec<_> = h
        .bus
        .history(None)
        .into_iter()
        .filter_map(|e| match e.kind {
            MeshEventKind::HealthChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(HealthStatus::Unknown, HealthStatus::Degraded)]);

    let summary = monitor.summary("svc").expect("summary");
    assert_eq!(summary.healthy_endpoints, 1);
    assert_eq!(summary.total_endpoints, 2);
    assert!((summary.healthy_ratio - 0.5).abs() < f64::EPSILON);

    // The endpoint recovers and rejoins the rotation
    h.transport.set_reply("10.0.0.1:8081", ScriptedReply::ok(serde_json::json!({})));
    assert_eq!(
        monitor.check_service("svc").await.expect("check"),
        HealthStatus::Healthy
    );
    let mut seen: Vec<_> = (0..4)
        .map(|_| h.registry.resolve("svc").expect("resolve").endpoint().address())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_client_errors_and_slow_probes_are_degraded() {
    let transport = ScriptedTransport::new()
        .with_reply("10.0.0.1:1", ScriptedReply::status(404))
        .with_reply(
            "10.0.0.1:2",
            ScriptedReply::ok(serde_json::json!({})).with_delay(Duration::from_millis(70)),
        );
    let h = HarnessBuilder::new(transport).build();
    let monitor = h.health_monitor(fast_probes());
    h.registry.register(service("notfound", &[1])).expect("register");
    h.registry.register(service("slow", &[2])).expect("register");

    assert_eq!(
        monitor.check_service("notfound").await.expect("check"),
        HealthStatus::Degraded
    );
    assert_eq!(
        monitor.check_service("slow").await.expect("check"),
        HealthStatus::Degraded
    );

    let record = monitor.record("slow").expect("record");
    let probe = &record.endpoints[0];
    assert_eq!(probe.status_code, Some(200));
    assert!(probe.response_time_ms.expect("timed") >= 50.0);
    // Degraded endpoints still take traffic
    assert!(h.registry.resolve("slow").is_ok());
}

#[tokio::test]
async fn test_unreachable_service_is_unhealthy_and_trips_breaker() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::failure("refused"));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(2))
        .build();
    let monitor = h.health_monitor(fast_probes());
    h.registry.register(service("svc", &[1, 2])).expect("register");
    let breaker = h.breakers.get_or_create("svc");

    for _ in 0..2 {
        assert_eq!(
            monitor.check_service("svc").await.expect("check"),
            HealthStatus::Unhealthy
        );
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(h.event_names().contains(&"breaker_state_changed"));
    assert!(matches!(
        h.registry.resolve("svc"),
        Err(Error::LoadBalancing { .. })
    ));
    assert_eq!(monitor.counts(), (0, 1));

    let record = monitor.record("svc").expect("record");
    assert_eq!(record.consecutive_failures, 2);
    assert_eq!(record.total_probes, 4);
    assert_eq!(record.failed_probes, 4);
    assert!(record.endpoints.iter().all(|e| e.error.is_some()));
}

#[tokio::test]
async fn test_probe_timeout_is_unhealthy() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(serde_json::json!({})).with_delay(Duration::from_millis(300)));
    let h = HarnessBuilder::new(transport).build();
    let monitor = h.health_monitor(HealthConfig {
        probe_timeout_ms: 20,
        ..fast_probes()
    });
    h.registry.register(service("svc", &[1])).expect("register");

    assert_eq!(
        monitor.check_service("svc").await.expect("check"),
        HealthStatus::Unhealthy
    );
    let record = monitor.record("svc").expect("record");
    assert!(record.endpoints[0].response_time_ms.is_none());
    assert!(
        record.endpoints[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("health probe exceeded 20ms"))
    );
}

/// While the one half-open call is still running, a passing health check
/// must not let a second call through.
#[tokio::test]
async fn test_passing_check_keeps_half_open_gate_closed() {
    let transport = ScriptedTransport::new().with_reply(
        "10.0.0.1:1",
        ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(300)),
    );
    let h = HarnessBuilder::new(transport)
        .breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_success_threshold(3)
                .with_recovery_timeout(Duration::from_millis(20)),
        )
        .build();
    let monitor = h.health_monitor(HealthConfig {
        probe_timeout_ms: 30,
        ..fast_probes()
    });
    h.registry.register(service("svc", &[1, 2])).expect("register");
    let breaker = h.breakers.get_or_create("svc");
    assert!(breaker.record_failure().is_some());
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Round robin starts at the slow endpoint
    let trial = h
        .dispatcher
        .send_request(ServiceRequest::post("svc", "/a", json!({})));
    let meanwhile = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = monitor.check_service("svc").await.expect("check");
        let second = h
            .dispatcher
            .send_request(ServiceRequest::post("svc", "/b", json!({})))
            .await;
        (status, second)
    };
    let (first, (status, second)) = tokio::join!(trial, meanwhile);

    assert_eq!(status, HealthStatus::Degraded);
    assert!(second.expect_err("gate held").is_circuit_open());
    assert_eq!(h.transport.calls_to("/b"), 0);
    assert_eq!(first.expect("trial call").status_code, 200);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::HalfOpen);
    assert_eq!(snapshot.success_count, 1);
}

#[tokio::test]
async fn test_results_for_replaced_registration_are_dropped() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::status(503).with_delay(Duration::from_millis(80)));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(1))
        .build();
    let monitor = h.health_monitor(fast_probes());
    h.registry.register(service("svc", &[1])).expect("register");

    let replace = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.unregister("svc");
        h.registry.register(service("svc", &[1])).expect("register again");
        h.breakers.get_or_create("svc");
    };
    let (outcome, ()) = tokio::join!(monitor.check_service("svc"), replace);

    assert!(matches!(outcome, Err(Error::ServiceNotFound { .. })));
    assert!(monitor.record("svc").is_none());
    assert_eq!(h.breakers.get_or_create("svc").state(), CircuitState::Closed);
    assert!(h.registry.resolve("svc").is_ok());
    assert!(h.event_names().is_empty());
}

#[tokio::test]
async fn test_breaker_feed_can_be_disabled() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::status(500));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(1))
        .build();
    let monitor = h.health_monitor(fast_probes());
    monitor.set_breaker_feed(false);
    h.registry.register(service("a", &[1])).expect("register");
    h.registry.register(service("b", &[2])).expect("register");
    h.breakers.get_or_create("a");

    assert_eq!(monitor.check_now().await, 2);
    assert_eq!(h.breakers.get_or_create("a").state(), CircuitState::Closed);
    // Breakers are only fed, never created, by the monitor
    assert!(h.breakers.get("b").is_none());
    assert_eq!(monitor.counts(), (0, 2));
}

#[tokio::test]
async fn test_background_sweeps_until_stopped() {
    let h = HarnessBuilder::new(ScriptedTransport::new()).build();
    let monitor = h.health_monitor(fast_probes());
    h.registry.register(service("svc", &[1])).expect("register");

    let task = monitor.start(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(90)).await;
    task.stop().await;
    assert!(!task.is_running());

    let probes = monitor.record("svc").expect("record").total_probes;
    assert!(probes >= 2, "only {probes} probes ran");
    assert_eq!(monitor.status("svc").expect("status"), HealthStatus::Healthy);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(monitor.record("svc").expect("record").total_probes, probes);
}

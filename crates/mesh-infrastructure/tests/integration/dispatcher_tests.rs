//! Request dispatcher tests against a scripted backend

use super::support::{HarnessBuilder, service};
use futures::StreamExt;
use mesh_domain::{CircuitState, Error, ServiceRequest, TimeoutOperation};
use mesh_infrastructure::config::CircuitBreakerConfig;
use mesh_infrastructure::transport::{ScriptedReply, ScriptedTransport};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_invalid_requests_never_reach_the_network() {
    let h = HarnessBuilder::new(ScriptedTransport::new()).build();
    h.registry.register(service("pricing", &[8080])).expect("register");

    let invalid = [
        ServiceRequest::new("pricing", "FETCH", "/quote"),
        ServiceRequest::get("pricing", "quote"),
        ServiceRequest::get("pricing", "/quo te"),
        ServiceRequest::get("pricing", "/quote").with_header("bad name", "v"),
        ServiceRequest::get("pricing", "/quote").with_header("X-Trace", "a\r\nb"),
        ServiceRequest::get("pricing", "/quote").with_body(json!({"q": 1})),
    ];
    for request in invalid {
        let err = h.dispatcher.send_request(request).await.expect_err("invalid");
        assert!(err.is_validation(), "unexpected error {err}");
    }

    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.metrics.service_metrics("pricing").requests_rejected, 6);
}

#[tokio::test]
async fn test_unknown_service() {
    let h = HarnessBuilder::new(ScriptedTransport::new()).build();
    let err = h
        .dispatcher
        .send_request(ServiceRequest::get("ghost", "/"))
        .await
        .expect_err("unknown");
    assert!(matches!(err, Error::ServiceNotFound { .. }));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_get_responses_are_cached_per_service() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::ok(json!({"price": 42})));
    let h = HarnessBuilder::new(transport).build();
    h.registry.register(service("pricing", &[8080])).expect("register");

    let first = h
        .dispatcher
        .send_request(ServiceRequest::get("pricing", "/quote"))
        .await
        .expect("first call");
    assert!(!first.cached);
    assert_eq!(first.endpoint.as_deref(), Some("10.0.0.1:8080"));

    let second = h
        .dispatcher
        .send_request(ServiceRequest::get("pricing", "/quote"))
        .await
        .expect("cached call");
    assert!(second.cached);
    assert_eq!(second.body, json!({"price": 42}));
    assert_eq!(h.transport.call_count(), 1);

    let post = h
        .dispatcher
        .send_request(ServiceRequest::post("pricing", "/quote", json!({"sku": "a"})))
        .await
        .expect("post");
    assert!(!post.cached);
    assert_eq!(h.transport.call_count(), 2);

    assert_eq!(h.cache.invalidate_tag("pricing"), 1);
    h.dispatcher.set_caching_enabled(false);
    let uncached = h
        .dispatcher
        .send_request(ServiceRequest::get("pricing", "/quote"))
        .await
        .expect("uncached");
    assert!(!uncached.cached);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(30)));
    let h = HarnessBuilder::new(transport)
        .limit(2, Duration::from_secs(2))
        .build();
    h.registry.register(service("svc", &[1, 2, 3])).expect("register");

    let requests: Vec<_> = (0..8)
        .map(|i| ServiceRequest::post("svc", format!("/job/{i}"), json!({ "i": i })))
        .collect();
    let results: Vec<_> = h.dispatcher.send_batch(requests).collect().await;

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    let mut indexes: Vec<_> = results.iter().map(|(i, _)| *i).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..8).collect::<Vec<_>>());

    assert!(h.transport.peak_in_flight() <= 2);
    assert_eq!(h.limiter.peak_in_flight(), 2);
    assert_eq!(h.limiter.in_flight(), 0);
}

#[tokio::test]
async fn test_slot_acquire_timeout_is_busy() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(200)));
    let h = HarnessBuilder::new(transport)
        .limit(1, Duration::from_millis(20))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");

    let (a, b) = tokio::join!(
        h.dispatcher
            .send_request(ServiceRequest::post("svc", "/a", json!({}))),
        h.dispatcher
            .send_request(ServiceRequest::post("svc", "/b", json!({}))),
    );
    let outcomes = [a, b];
    let busy: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(busy.len(), 1);
    assert!(busy[0].is_busy());
    assert!(matches!(
        busy[0],
        Error::AsyncTimeout {
            operation: TimeoutOperation::SlotAcquire,
            ..
        }
    ));
    assert_eq!(h.transport.call_count(), 1);
    // A busy mesh says nothing about the backend
    assert_eq!(h.breakers.get_or_create("svc").snapshot().failure_count, 0);
}

#[tokio::test]
async fn test_call_timeout_counts_as_failure() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(200)));
    let h = HarnessBuilder::new(transport).build();
    h.registry.register(service("slow", &[1])).expect("register");

    let err = h
        .dispatcher
        .send_request(ServiceRequest::get("slow", "/").with_timeout(Duration::from_millis(20)))
        .await
        .expect_err("times out");
    assert!(err.is_down());
    assert!(matches!(
        err,
        Error::AsyncTimeout {
            operation: TimeoutOperation::Call,
            ..
        }
    ));
    assert_eq!(h.breakers.get_or_create("slow").snapshot().failure_count, 1);
}

#[tokio::test]
async fn test_client_errors_do_not_trip_breaker() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::status(404));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(1))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");

    for _ in 0..3 {
        let response = h
            .dispatcher
            .send_request(ServiceRequest::get("svc", "/missing"))
            .await
            .expect("4xx is a response");
        assert_eq!(response.status_code, 404);
        assert!(!response.cached);
    }
    assert_eq!(h.breakers.get_or_create("svc").state(), CircuitState::Closed);
    assert!(h.cache.is_empty());
}

/// A pricing service goes down, the breaker opens and sheds load, then the
/// service recovers and the breaker closes again.
#[tokio::test]
async fn test_pricing_outage_and_recovery() {
    let transport =
        ScriptedTransport::new().with_default(ScriptedReply::ok(json!({"price": 42})));
    let h = HarnessBuilder::new(transport)
        .breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(1)
                .with_recovery_timeout(Duration::from_millis(50)),
        )
        .build();
    h.registry
        .register(service("pricing", &[8080, 8081]))
        .expect("register");
    let order = |sku: &str| ServiceRequest::post("pricing", "/quote", json!({ "sku": sku }));

    let ok = h.dispatcher.send_request(order("a")).await.expect("healthy");
    assert_eq!(ok.body["price"], 42);

    h.transport.set_default(ScriptedReply::status(503));
    for _ in 0..3 {
        let err = h.dispatcher.send_request(order("b")).await.expect_err("down");
        assert!(matches!(
            err,
            Error::ServiceUnavailable {
                status_code: Some(503),
                ..
            }
        ));
    }
    let calls_when_opened = h.transport.call_count();

    let err = h.dispatcher.send_request(order("c")).await.expect_err("open");
    assert!(err.is_circuit_open());
    assert_eq!(h.transport.call_count(), calls_when_opened);

    h.transport.set_default(ScriptedReply::ok(json!({"price": 43})));
    tokio::time::sleep(Duration::from_millis(70)).await;
    let recovered = h.dispatcher.send_request(order("d")).await.expect("probe");
    assert_eq!(recovered.body["price"], 43);
    assert_eq!(h.breakers.get_or_create("pricing").state(), CircuitState::Closed);

    let transitions: Vec<_> = h
        .bus
        .history(None)
        .into_iter()
        .filter(|e| e.name() == "breaker_state_changed")
        .collect();
    assert_eq!(transitions.len(), 3);

    let metrics = h.metrics.service_metrics("pricing");
    assert_eq!(metrics.requests_total, 2);
    assert_eq!(metrics.requests_failed, 3);
    assert_eq!(metrics.requests_rejected, 1);
    assert_eq!(metrics.circuit_state, Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_disabled_breaker_lets_calls_through() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::failure("refused"));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(1))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");
    h.dispatcher.set_breaker_enabled(false);

    for _ in 0..3 {
        let err = h
            .dispatcher
            .send_request(ServiceRequest::post("svc", "/", json!({})))
            .await
            .expect_err("refused");
        assert!(matches!(err, Error::Network { .. }));
    }
    assert_eq!(h.transport.call_count(), 3);
    assert!(h.breakers.is_empty());
}

#[tokio::test]
async fn test_call_outliving_its_registration_leaves_no_trace() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({"v": 1})).with_delay(Duration::from_millis(150)));
    let h = HarnessBuilder::new(transport).build();
    h.registry.register(service("svc", &[1])).expect("register");

    let replace = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.unregister("svc");
        h.transport.set_default(ScriptedReply::ok(json!({"v": 2})));
        h.registry.register(service("svc", &[1])).expect("register again");
    };
    let (stale, ()) = tokio::join!(
        h.dispatcher.send_request(ServiceRequest::get("svc", "/v")),
        replace
    );
    assert_eq!(stale.expect("in-flight call completes").body, json!({"v": 1}));

    assert!(h.cache.is_empty());
    assert!(!h.metrics.render_prometheus().contains("service=\"svc\""));
    assert!(h.event_names().is_empty());

    let fresh = h
        .dispatcher
        .send_request(ServiceRequest::get("svc", "/v"))
        .await
        .expect("new registration");
    assert!(!fresh.cached);
    assert_eq!(fresh.body, json!({"v": 2}));
    assert_eq!(h.metrics.service_metrics("svc").requests_total, 1);
}

#[tokio::test]
async fn test_failure_after_unregister_does_not_trip_new_breaker() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::status(503).with_delay(Duration::from_millis(100)));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(1))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");

    let replace = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.unregister("svc");
        h.registry.register(service("svc", &[1])).expect("register again");
    };
    let (stale, ()) = tokio::join!(
        h.dispatcher
            .send_request(ServiceRequest::post("svc", "/", json!({}))),
        replace
    );
    assert!(stale.expect_err("503").is_down());

    assert!(h.event_names().is_empty());
    assert_eq!(h.metrics.service_metrics("svc").requests_failed, 0);
    assert!(h.breakers.get("svc").is_none());
    assert_eq!(h.breakers.get_or_create("svc").state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_breaker_opens_after_exact_threshold() {
    let transport = ScriptedTransport::new().with_default(ScriptedReply::status(503));
    let h = HarnessBuilder::new(transport)
        .breaker(CircuitBreakerConfig::default().with_failure_threshold(3))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let err = h
            .dispatcher
            .send_request(ServiceRequest::post("svc", "/", json!({})))
            .await
            .expect_err("failing backend");
        outcomes.push(err);
    }

    for err in &outcomes[..3] {
        assert!(matches!(err, Error::ServiceUnavailable { .. }), "got {err}");
    }
    for err in &outcomes[3..] {
        assert!(err.is_circuit_open(), "got {err}");
    }
    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(h.breakers.get_or_create("svc").state(), CircuitState::Open);
}

#[tokio::test]
async fn test_batch_is_lazy_and_yields_in_completion_order() {
    let transport = ScriptedTransport::new().with_reply(
        "10.0.0.1:1",
        ScriptedReply::ok(json!({"slow": true})).with_delay(Duration::from_millis(100)),
    );
    let h = HarnessBuilder::new(transport).build();
    h.registry.register(service("slow", &[1])).expect("register");
    h.registry.register(service("fast", &[2])).expect("register");

    let batch = h.dispatcher.send_batch(vec![
        ServiceRequest::post("slow", "/", json!({})),
        ServiceRequest::post("fast", "/", json!({})),
    ]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.transport.call_count(), 0);

    let results: Vec<_> = batch.collect().await;
    let order: Vec<_> = results.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![1, 0]);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test]
async fn test_dropped_waiting_request_frees_its_slot() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(100)));
    let h = HarnessBuilder::new(transport)
        .limit(1, Duration::from_secs(5))
        .build();
    h.registry.register(service("svc", &[1])).expect("register");

    let holder = h
        .dispatcher
        .send_request(ServiceRequest::post("svc", "/hold", json!({})));
    let abandoned = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::timeout(
            Duration::from_millis(20),
            h.dispatcher
                .send_request(ServiceRequest::post("svc", "/wait", json!({}))),
        )
        .await
    };
    let (held, waited) = tokio::join!(holder, abandoned);
    assert!(held.is_ok());
    assert!(waited.is_err(), "waiter should still be parked when dropped");

    let stats = h.limiter.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.available, stats.limit);
    assert_eq!(h.transport.calls_to("/wait"), 0);

    let next = h
        .dispatcher
        .send_request(ServiceRequest::post("svc", "/next", json!({})))
        .await;
    assert!(next.is_ok());
    assert_eq!(h.limiter.stats().acquired, 2);
}

#[tokio::test]
async fn test_per_service_limit_isolates_services() {
    let transport = ScriptedTransport::new()
        .with_default(ScriptedReply::ok(json!({})).with_delay(Duration::from_millis(40)));
    let h = HarnessBuilder::new(transport)
        .limit(10, Duration::from_secs(2))
        .per_service(1)
        .build();
    h.registry.register(service("busy", &[1])).expect("register");
    h.registry.register(service("other", &[2])).expect("register");

    let mut requests: Vec<_> = (0..3)
        .map(|i| ServiceRequest::post("busy", format!("/job/{i}"), json!({})))
        .collect();
    requests.push(ServiceRequest::post("other", "/job", json!({})));
    let results: Vec<_> = h.dispatcher.send_batch(requests).collect().await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    // One call per service at a time, but the services run side by side
    assert_eq!(h.transport.peak_in_flight(), 2);
    assert_eq!(h.limiter.peak_in_flight(), 2);
    // The other service did not queue behind the busy one
    assert_ne!(results.last().map(|(i, _)| *i), Some(3));
}

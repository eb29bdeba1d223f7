//! Service registry tests

use mesh_domain::{Endpoint, Error, ServiceDescriptor};
use mesh_infrastructure::config::{LoadBalancingConfig, LoadBalancingPolicy};
use mesh_infrastructure::routing::ServiceRegistry;
use std::cell::Cell;

fn descriptor(id: &str, ports: &[u16]) -> ServiceDescriptor {
    let mut endpoints = ports.iter().map(|p| Endpoint::new("10.1.0.1", *p));
    let first = endpoints.next().expect("at least one port");
    endpoints.fold(ServiceDescriptor::new(id, id.to_uppercase(), first), |d, e| {
        d.with_endpoint(e)
    })
}

#[test]
fn test_register_get_unregister_round_trip() {
    let registry = ServiceRegistry::default();
    let registered = registry
        .register(descriptor("pricing", &[8080]))
        .expect("register");
    assert_eq!(registered.id, "pricing");
    assert!(registry.contains("pricing"));
    assert_eq!(registry.get("pricing").expect("get").name, "PRICING");

    registry.unregister("pricing").expect("unregister");
    assert!(matches!(
        registry.get("pricing"),
        Err(Error::ServiceNotFound { .. })
    ));
    assert!(matches!(
        registry.unregister("pricing"),
        Err(Error::ServiceNotFound { .. })
    ));
}

#[test]
fn test_duplicate_registration_rejected() {
    let registry = ServiceRegistry::default();
    registry.register(descriptor("a", &[1])).expect("first");
    assert!(matches!(
        registry.register(descriptor("a", &[2])),
        Err(Error::ServiceAlreadyRegistered { .. })
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_invalid_descriptors_rejected() {
    let registry = ServiceRegistry::default();
    let endpoint = Endpoint::new("h", 80);

    let bad = [
        ServiceDescriptor::new("", "name", endpoint.clone()),
        ServiceDescriptor::new("has space", "name", endpoint.clone()),
        ServiceDescriptor::new("x".repeat(129), "name", endpoint.clone()),
        ServiceDescriptor::new("ok", "name", Endpoint::new("h", 0)),
        ServiceDescriptor::new("ok", "name", Endpoint::new(" ", 80)),
        ServiceDescriptor {
            endpoints: Vec::new(),
            ..ServiceDescriptor::new("ok", "name", endpoint)
        },
    ];
    for descriptor in bad {
        let err = registry.register(descriptor).expect_err("invalid");
        assert!(err.is_validation(), "unexpected error {err}");
    }
    assert!(registry.is_empty());
}

#[test]
fn test_unregister_with_runs_cleanup_once() {
    let registry = ServiceRegistry::default();
    registry.register(descriptor("svc", &[1])).expect("register");
    let calls = Cell::new(0);

    registry
        .unregister_with("svc", |d| {
            assert_eq!(d.id, "svc");
            calls.set(calls.get() + 1);
        })
        .expect("unregister");
    assert!(registry.unregister_with("svc", |_| calls.set(calls.get() + 1)).is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_list_is_sorted_snapshot() {
    let registry = ServiceRegistry::default();
    for id in ["c", "a", "b"] {
        registry.register(descriptor(id, &[1])).expect("register");
    }
    let snapshot = registry.list();
    registry.unregister("a").expect("unregister");

    let ids: Vec<_> = snapshot.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(registry.ids(), vec!["b", "c"]);
}

#[test]
fn test_resolve_round_robin_and_eligibility() {
    let registry = ServiceRegistry::default();
    registry
        .register(descriptor("svc", &[1, 2, 3]))
        .expect("register");

    let ports: Vec<u16> = (0..3)
        .map(|_| registry.resolve("svc").expect("lease").endpoint().port())
        .collect();
    assert_eq!(ports, vec![1, 2, 3]);

    for port in [1, 2, 3] {
        assert!(registry.set_endpoint_eligible("svc", &format!("10.1.0.1:{port}"), false));
    }
    assert!(matches!(
        registry.resolve("svc"),
        Err(Error::LoadBalancing { .. })
    ));
    assert!(matches!(
        registry.resolve("missing"),
        Err(Error::ServiceNotFound { .. })
    ));
}

#[test]
fn test_least_connections_tracks_leases() {
    let registry = ServiceRegistry::new(&LoadBalancingConfig {
        policy: LoadBalancingPolicy::LeastConnections,
        skip_unhealthy: true,
    });
    registry.register(descriptor("svc", &[1, 2])).expect("register");

    let held = registry.resolve("svc").expect("lease");
    assert_eq!(held.endpoint().port(), 1);
    let next = registry.resolve("svc").expect("lease");
    assert_eq!(next.endpoint().port(), 2);

    let connections = registry.active_connections("svc").expect("known");
    assert_eq!(connections, vec![("10.1.0.1:1".to_string(), 1), ("10.1.0.1:2".to_string(), 1)]);
    drop(held);
    drop(next);
    assert!(registry
        .active_connections("svc")
        .expect("known")
        .iter()
        .all(|(_, active)| *active == 0));
}

#[test]
fn test_disabled_balancing_pins_first_endpoint() {
    let registry = ServiceRegistry::default();
    registry.register(descriptor("svc", &[1, 2])).expect("register");
    registry.set_balancing_enabled(false);
    for _ in 0..3 {
        assert_eq!(registry.resolve("svc").expect("lease").endpoint().port(), 1);
    }
}

#[test]
fn test_reregistration_starts_a_new_generation() {
    let registry = ServiceRegistry::default();
    registry.register(descriptor("svc", &[1, 2])).expect("register");
    let first = registry.registration("svc").expect("registration");
    let lease = registry.resolve("svc").expect("resolve");
    assert_eq!(lease.generation(), first.generation);
    assert_eq!(registry.with_registration("svc", first.generation, |d| d.endpoints.len()), Some(2));

    registry.unregister("svc").expect("unregister");
    assert!(registry.with_registration("svc", first.generation, |_| ()).is_none());
    assert!(!registry.mark_endpoints("svc", first.generation, &[("10.1.0.1:1".to_string(), false)]));

    registry.register(descriptor("svc", &[1])).expect("register again");
    let second = registry.registration("svc").expect("registration");
    assert_ne!(second.generation, first.generation);
    assert!(registry.with_registration("svc", first.generation, |_| ()).is_none());
    assert!(registry.mark_endpoints("svc", second.generation, &[("10.1.0.1:1".to_string(), false)]));
    assert!(matches!(
        registry.resolve("svc"),
        Err(Error::LoadBalancing { .. })
    ));
}

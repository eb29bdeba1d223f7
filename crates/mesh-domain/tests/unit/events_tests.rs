//! Unit tests for mesh events

use mesh_domain::{CircuitState, MeshEvent, MeshEventKind};

#[test]
fn test_event_names() {
    let event = MeshEvent::for_service(
        "pricing",
        MeshEventKind::BreakerStateChanged {
            from: CircuitState::Closed,
            to: CircuitState::Open,
        },
    );
    assert_eq!(event.name(), "breaker_state_changed");
    assert_eq!(event.service_id.as_deref(), Some("pricing"));
    assert_eq!(MeshEvent::mesh(MeshEventKind::MeshStarted).name(), "mesh_started");
}

#[test]
fn test_event_ids_are_unique() {
    let a = MeshEvent::mesh(MeshEventKind::MeshStopped);
    let b = MeshEvent::mesh(MeshEventKind::MeshStopped);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_event_serializes_tagged() {
    let event = MeshEvent::for_service(
        "pricing",
        MeshEventKind::RequestCompleted {
            method: "GET".into(),
            path: "/quotes".into(),
            status_code: 200,
            response_time_ms: 12.5,
            cached: false,
        },
    );
    let value = serde_json::to_value(&event).expect("serialization should succeed");

    assert_eq!(value["type"], "request_completed");
    assert_eq!(value["service_id"], "pricing");
    assert_eq!(value["status_code"], 200);

    let back: MeshEvent = serde_json::from_value(value).expect("deserialization should succeed");
    assert_eq!(back, event);
}

//! Event bus tests

use mesh_domain::error::Result;
use mesh_domain::ports::{MeshObserver, ObserverRole};
use mesh_domain::{Error, MeshEvent, MeshEventKind};
use mesh_infrastructure::events::EventBus;
use std::sync::{Arc, Mutex};

/// Records the events it sees into a shared log, tagged with its name
struct Recorder {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl MeshObserver for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Logging
    }

    fn update(&self, event: &MeshEvent) -> Result<()> {
        self.log
            .lock()
            .expect("log")
            .push(format!("{}:{}", self.name, event.name()));
        Ok(())
    }
}

struct Failing;

impl MeshObserver for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Alerting
    }

    fn update(&self, _event: &MeshEvent) -> Result<()> {
        Err(Error::internal("observer broke"))
    }
}

struct Panicking;

impl MeshObserver for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Metrics
    }

    fn update(&self, _event: &MeshEvent) -> Result<()> {
        panic!("observer panicked");
    }
}

fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn MeshObserver> {
    Arc::new(Recorder {
        name: name.to_string(),
        log: Arc::clone(log),
    })
}

#[test]
fn test_delivery_in_subscription_order() {
    let bus = EventBus::new(10);
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(recorder("first", &log));
    bus.subscribe(recorder("second", &log));

    bus.publish(MeshEvent::mesh(MeshEventKind::MeshStarted));
    bus.publish(MeshEvent::mesh(MeshEventKind::MeshStopped));

    assert_eq!(
        *log.lock().expect("log"),
        vec![
            "first:mesh_started",
            "second:mesh_started",
            "first:mesh_stopped",
            "second:mesh_stopped",
        ]
    );
}

#[test]
fn test_failing_observers_do_not_block_others() {
    let bus = EventBus::new(10);
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(Arc::new(Failing));
    bus.subscribe(Arc::new(Panicking));
    bus.subscribe(recorder("after", &log));

    let delivered = bus.publish(MeshEvent::for_service("svc", MeshEventKind::ServiceUnregistered));

    assert_eq!(delivered, 1);
    assert_eq!(bus.observer_failure_count(), 2);
    assert_eq!(log.lock().expect("log").len(), 1);
}

#[test]
fn test_unsubscribe_by_name() {
    let bus = EventBus::new(10);
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(recorder("keep", &log));
    bus.subscribe(recorder("drop", &log));

    assert!(bus.unsubscribe("drop"));
    assert!(!bus.unsubscribe("drop"));
    let names: Vec<_> = bus.observers().into_iter().map(|o| o.name).collect();
    assert_eq!(names, vec!["keep"]);
}

#[test]
fn test_history_is_bounded() {
    let bus = EventBus::new(3);
    for i in 0..5 {
        bus.publish(MeshEvent::for_service(
            format!("svc-{i}"),
            MeshEventKind::ServiceUnregistered,
        ));
    }
    let history = bus.history(None);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].service_id.as_deref(), Some("svc-2"));
    assert_eq!(bus.history(Some(1))[0].service_id.as_deref(), Some("svc-4"));
    assert_eq!(bus.published_count(), 5);

    bus.clear_history();
    assert!(bus.history(None).is_empty());
}

#[test]
fn test_event_serializes_with_type_tag() {
    let event = MeshEvent::for_service(
        "pricing",
        MeshEventKind::CacheEvicted {
            key: "pricing:GET:/q".to_string(),
        },
    );
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["type"], "cache_evicted");
    assert_eq!(value["key"], "pricing:GET:/q");
    assert_eq!(value["service_id"], "pricing");
}

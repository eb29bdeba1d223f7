//! Unit tests for service descriptors and endpoints

use mesh_domain::constants::MAX_SERVICE_ID_LENGTH;
use mesh_domain::{Endpoint, Error, Protocol, ServiceDescriptor};

fn descriptor(id: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(id, "Pricing", Endpoint::new("10.0.0.1", 8080))
}

#[test]
fn test_endpoint_urls() {
    let endpoint = Endpoint::new("pricing.internal", 8443)
        .with_protocol(Protocol::Https)
        .with_path("/api/");

    assert_eq!(endpoint.address(), "pricing.internal:8443");
    assert_eq!(endpoint.url(), "https://pricing.internal:8443/api");
    assert_eq!(
        endpoint.url_for("/quotes"),
        "https://pricing.internal:8443/api/quotes"
    );
    assert_eq!(endpoint.health_path(), "/health");
}

#[test]
fn test_endpoint_custom_health_path() {
    let endpoint = Endpoint::new("localhost", 9000).with_health_path("/ready");
    assert_eq!(endpoint.health_path(), "/ready");
}

#[test]
fn test_valid_descriptor() {
    let svc = descriptor("pricing")
        .with_type("api")
        .with_version("1.2.0")
        .with_endpoint(Endpoint::new("10.0.0.2", 8080))
        .with_dependency("catalog");

    assert!(svc.validate().is_ok());
    assert_eq!(svc.endpoints.len(), 2);
    assert_eq!(svc.dependencies, vec!["catalog".to_string()]);
}

#[test]
fn test_descriptor_rejects_bad_ids() {
    for id in ["", "   ", "has space"] {
        let err = descriptor(id).validate().expect_err("id must be rejected");
        assert!(matches!(err, Error::InvalidServiceConfiguration { .. }), "{id:?}");
    }

    let long_id = "a".repeat(MAX_SERVICE_ID_LENGTH + 1);
    assert!(descriptor(&long_id).validate().is_err());

    let max_id = "a".repeat(MAX_SERVICE_ID_LENGTH);
    assert!(descriptor(&max_id).validate().is_ok());
}

#[test]
fn test_descriptor_rejects_empty_name_and_endpoints() {
    let mut svc = descriptor("pricing");
    svc.name = String::new();
    assert!(svc.validate().is_err());

    let mut svc = descriptor("pricing");
    svc.endpoints.clear();
    assert!(svc.validate().is_err());
}

#[test]
fn test_descriptor_rejects_bad_endpoints() {
    let svc = ServiceDescriptor::new("pricing", "Pricing", Endpoint::new("", 8080));
    assert!(svc.validate().is_err());

    let svc = ServiceDescriptor::new("pricing", "Pricing", Endpoint::new("host", 0));
    assert!(svc.validate().is_err());

    let svc = ServiceDescriptor::new(
        "pricing",
        "Pricing",
        Endpoint::new("host", 80).with_path("api"),
    );
    assert!(svc.validate().is_err());
}

#[test]
fn test_descriptor_deserializes_type_field() {
    let json = serde_json::json!({
        "id": "pricing",
        "name": "Pricing",
        "type": "api",
        "endpoints": [{"host": "localhost", "port": 8080}]
    });
    let svc: ServiceDescriptor = serde_json::from_value(json).expect("valid descriptor");

    assert_eq!(svc.service_type, "api");
    assert_eq!(svc.endpoints[0].protocol(), Protocol::Http);
    assert!(svc.validate().is_ok());
}

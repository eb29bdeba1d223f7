//! Error context extension tests

use mesh_domain::Error;
use mesh_infrastructure::ErrorContext;
use std::io;

fn io_failure() -> Result<(), io::Error> {
    Err(io::Error::new(io::ErrorKind::NotFound, "missing"))
}

#[test]
fn test_io_context_keeps_source() {
    let err = io_failure().io_context("reading snapshot").expect_err("fails");
    match err {
        Error::Io { message, source } => {
            assert_eq!(message, "reading snapshot: missing");
            assert!(source.is_some());
        }
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn test_config_and_network_context() {
    let err = io_failure().config_context("bad file").expect_err("fails");
    assert!(matches!(err, Error::Configuration { .. }));

    let err = io_failure().network_context("dial").expect_err("fails");
    assert!(err.is_down());
}

#[test]
fn test_lazy_context_is_internal() {
    let err = io_failure()
        .with_context(|| format!("step {}", 3))
        .expect_err("fails");
    assert!(matches!(err, Error::Internal { .. }));
    assert!(err.to_string().contains("step 3: missing"));
}

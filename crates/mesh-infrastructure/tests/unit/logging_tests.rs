//! Logging Tests

use mesh_infrastructure::constants::DEFAULT_LOG_LEVEL;
use mesh_infrastructure::logging::{LoggingConfig, parse_log_level};
use tracing::Level;

#[test]
fn test_parse_log_level() {
    assert_eq!(parse_log_level("trace").expect("trace"), Level::TRACE);
    assert_eq!(parse_log_level("debug").expect("debug"), Level::DEBUG);
    assert_eq!(parse_log_level("INFO").expect("info"), Level::INFO);
    assert_eq!(parse_log_level("warning").expect("warn"), Level::WARN);
    assert_eq!(parse_log_level("error").expect("error"), Level::ERROR);

    assert!(parse_log_level("verbose").is_err());
}

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, DEFAULT_LOG_LEVEL);
    assert!(!config.json_format);
    assert!(config.file_output.is_none());
}

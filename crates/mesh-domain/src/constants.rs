//! Domain validation limits

/// Maximum length of a service id
pub const MAX_SERVICE_ID_LENGTH: usize = 128;

/// Default probe path appended to an endpoint when none is configured
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// HTTP verbs accepted by the dispatcher
pub const SUPPORTED_HTTP_METHODS: [&str; 7] =
    ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

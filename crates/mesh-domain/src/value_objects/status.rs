use serde::{Deserialize, Serialize};

/// Snapshot returned by the mesh status query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshStatus {
    /// Background monitoring is running
    pub running: bool,
    /// Registered services
    pub services_count: usize,
    /// Services whose last probe classified them healthy
    pub healthy_count: usize,
    /// Services whose last probe classified them unhealthy
    pub unhealthy_count: usize,
}

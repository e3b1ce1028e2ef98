//! Configuration types for event delivery.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Beacons buffered for the background sender before falling back.
    pub queue_capacity: usize,
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            request_timeout_ms: 5_000,
            user_agent: concat!("footfall/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

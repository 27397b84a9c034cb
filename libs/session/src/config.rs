//! Session loop configuration.

use std::time::Duration;

use rsvp_transport::DEFAULT_NAMESPACE;

/// Default heartbeat interval (0.25 Hz).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Default number of missed heartbeats before a requester is presumed gone.
pub const DEFAULT_LIVENESS_MULTIPLIER: u32 = 4;

/// Configuration shared by the requester and scheduler session loops.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between unconditional snapshot retransmissions.
    pub heartbeat_interval: Duration,

    /// The scheduler drops a requester not heard from within
    /// `heartbeat_interval * liveness_multiplier`.
    pub liveness_multiplier: u32,

    /// Topic namespace; both parties must agree on it.
    pub namespace: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            liveness_multiplier: DEFAULT_LIVENESS_MULTIPLIER,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl SessionConfig {
    /// How long a requester may stay silent before eviction.
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval * self.liveness_multiplier
    }
}

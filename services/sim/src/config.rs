//! Configuration for the simulator.

use std::time::Duration;

use anyhow::Result;
use rsvp_session::config::DEFAULT_LIVENESS_MULTIPLIER;
use rsvp_session::SessionConfig;

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Heartbeat interval for both session loops.
    pub heartbeat_interval: Duration,

    /// Topic namespace on the bus.
    pub namespace: String,

    /// How long granted resources are held before the demo releases them.
    pub hold: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let heartbeat_ms = std::env::var("RSVP_HEARTBEAT_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let namespace =
            std::env::var("RSVP_NAMESPACE").unwrap_or_else(|_| "rsvp-sim".to_string());

        let hold_ms = std::env::var("RSVP_SIM_HOLD_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2_000);

        Ok(Self {
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            namespace,
            hold: Duration::from_millis(hold_ms),
        })
    }

    /// Session configuration for both loops.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: self.heartbeat_interval,
            liveness_multiplier: DEFAULT_LIVENESS_MULTIPLIER,
            namespace: self.namespace.clone(),
        }
    }
}

//! # rsvp-session
//!
//! Session loops driving periodic snapshot exchange between requesters
//! and a scheduler:
//!
//! - [`Requester`]: owns the requester-side request set, merges scheduler
//!   feedback, and republishes on change or heartbeat.
//! - [`Scheduler`]: serves every requester on the shared requests topic,
//!   one scheduler-side set each, with a liveness watchdog.
//!
//! Both loops are generic over the [`rsvp_transport::SnapshotTransport`]
//! boundary and hold each set's mutations — merge, callback, conditional
//! retransmit — inside one critical section.

use thiserror::Error;

use rsvp_transport::TransportError;

pub mod config;
pub mod requester;
pub mod scheduler;

pub use config::SessionConfig;
pub use requester::{FeedbackFn, RequestOptions, Requester, RequesterHandle};
pub use scheduler::{PolicyFn, Scheduler};

/// Errors that terminate a session loop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport can no longer deliver snapshots.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

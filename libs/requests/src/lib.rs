//! # rsvp-requests
//!
//! Core negotiation state for RSVP resource scheduling: the per-request
//! state machine, the request-set container, and the snapshot merge
//! algorithm that reconciles a requester's view with a scheduler's.
//!
//! This crate is synchronous and transport-free. The async session loops
//! live in `rsvp-session`; snapshot delivery lives behind the
//! `rsvp-transport` boundary.
//!
//! ## Modules
//!
//! - `ids`: typed 128-bit request/requester IDs
//! - `descriptor`: wildcard descriptors, concrete resources, the matcher
//! - `status`: lifecycle status and its forward-progress order
//! - `request`: the per-request state machine
//! - `set`: request sets and the merge/reconciliation algorithm
//! - `snapshot`: the wire representation exchanged between parties
//! - `pool`: scheduler-side concrete-resource tracking

pub mod descriptor;
pub mod error;
pub mod ids;
pub mod pool;
pub mod request;
pub mod set;
pub mod snapshot;
pub mod status;

// Re-export commonly used types
pub use descriptor::{FieldPattern, Resource, ResourceDescriptor};
pub use error::RequestError;
pub use ids::{RequestId, RequesterId};
pub use pool::{PoolError, PoolStatus, ResourcePool};
pub use request::ResourceRequest;
pub use set::{AnomalyKind, MergeAnomaly, MergeOutcome, RequestSet, SetSide};
pub use snapshot::{RequestRecord, Snapshot};
pub use status::RequestStatus;

//! Wire representation of a request-set snapshot.
//!
//! Each party periodically publishes its *full* request set — never a delta.
//! Full snapshots keep the protocol correct under message loss, duplication,
//! and reordering; the merge algorithm in [`crate::set`] absorbs all three.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{Resource, ResourceDescriptor};
use crate::ids::{RequestId, RequesterId};
use crate::request::ResourceRequest;
use crate::status::RequestStatus;

/// A full snapshot of one requester's request set, as exchanged on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The requester these requests belong to.
    pub requester_id: RequesterId,

    /// When the snapshot was taken.
    pub stamp: DateTime<Utc>,

    /// Request records in the set's stable (ID) order.
    pub requests: Vec<RequestRecord>,
}

/// One request within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request ID.
    pub id: RequestId,

    /// Status at snapshot time.
    pub status: RequestStatus,

    /// The originally requested descriptor.
    pub descriptor: ResourceDescriptor,

    /// Concrete resource, present once granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    /// Scheduling priority; higher is more urgent.
    pub priority: i32,

    /// Reservation time; absent means "as soon as possible".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<DateTime<Utc>>,

    /// Estimated hold time; absent means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<Duration>,
}

impl From<&ResourceRequest> for RequestRecord {
    fn from(rq: &ResourceRequest) -> Self {
        Self {
            id: rq.id,
            status: rq.status,
            descriptor: rq.descriptor.clone(),
            resource: rq.resource.clone(),
            priority: rq.priority,
            reservation: rq.reservation,
            hold_time: rq.hold_time,
        }
    }
}

impl RequestRecord {
    /// Reconstructs a request from its wire record, preserving status and
    /// resource as reported by the peer.
    pub(crate) fn to_request(&self) -> ResourceRequest {
        ResourceRequest {
            id: self.id,
            status: self.status,
            descriptor: self.descriptor.clone(),
            priority: self.priority,
            reservation: self.reservation,
            hold_time: self.hold_time,
            resource: self.resource.clone(),
        }
    }
}

//! Request sets and snapshot reconciliation.
//!
//! A [`RequestSet`] is the single long-lived copy of one requester's
//! requests, owned either by the requester itself or by the scheduler
//! serving it. All mutation is funneled through the set's operations; the
//! merge algorithm folds a peer snapshot into the local set without ever
//! regressing a request's status.
//!
//! # Invariants
//!
//! - Status only moves forward along the lifecycle order (monotonic merge).
//! - Merging the same snapshot twice is a no-op the second time.
//! - A corrupt or unrecognized record never corrupts the local set; it is
//!   reported in the [`MergeOutcome`] instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::descriptor::Resource;
use crate::error::RequestError;
use crate::ids::{RequestId, RequesterId};
use crate::request::ResourceRequest;
use crate::snapshot::{RequestRecord, Snapshot};
use crate::status::RequestStatus;

/// Which party owns a request set.
///
/// The owner decides how unrecognized IDs in a peer snapshot are treated:
/// the requester is authoritative for request creation, the scheduler
/// learns of new requests from the requester's snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSide {
    /// The party that creates and tracks requests.
    Requester,
    /// The arbiter that grants or denies them.
    Scheduler,
}

/// Why a snapshot record could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// The peer referenced an active request this side never created
    /// (requester side) or has no record of granting (scheduler side).
    UnknownRequest,
    /// The record's concrete resource does not satisfy the local
    /// descriptor; the record was ignored as corrupt.
    ResourceMismatch,
}

/// One record in a peer snapshot that merge refused to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAnomaly {
    /// The offending request ID.
    pub id: RequestId,
    /// What was wrong with the record.
    pub kind: AnomalyKind,
    /// The status the peer reported.
    pub status: RequestStatus,
}

impl std::fmt::Display for MergeAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            AnomalyKind::UnknownRequest => "unknown request",
            AnomalyKind::ResourceMismatch => "resource mismatch",
        };
        write!(f, "{} for {} (peer status {})", what, self.id, self.status)
    }
}

/// Result of folding a peer snapshot into the local set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Whether the local set changed at all.
    pub changed: bool,
    /// Records that were flagged rather than applied. Never silently
    /// dropped; the session loop logs these.
    pub anomalies: Vec<MergeAnomaly>,
}

/// An ordered mapping of request ID to [`ResourceRequest`], owned by one
/// party.
///
/// Iteration order is the ID order, which keeps snapshot encoding
/// deterministic. Mutation during iteration is impossible: `iter` borrows
/// the set shared, and every mutating operation requires `&mut self`.
#[derive(Debug, Clone)]
pub struct RequestSet {
    side: SetSide,
    requester_id: RequesterId,
    requests: BTreeMap<RequestId, ResourceRequest>,
    version: u64,
}

impl RequestSet {
    /// Creates an empty set owned by the given side.
    pub fn new(side: SetSide, requester_id: RequesterId) -> Self {
        Self {
            side,
            requester_id,
            requests: BTreeMap::new(),
            version: 0,
        }
    }

    /// Which party owns this set.
    pub fn side(&self) -> SetSide {
        self.side
    }

    /// The requester whose requests this set tracks.
    pub fn requester_id(&self) -> RequesterId {
        self.requester_id
    }

    /// Monotonic mutation counter. Bumped by every operation that changes
    /// the set; the session loop compares versions to detect
    /// callback-driven changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of requests in the set.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the set holds no requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Membership test by ID.
    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    /// Request by ID, if known.
    pub fn get(&self, id: RequestId) -> Option<&ResourceRequest> {
        self.requests.get(&id)
    }

    /// Request by ID, failing with [`RequestError::NotFound`] if absent.
    pub fn lookup(&self, id: RequestId) -> Result<&ResourceRequest, RequestError> {
        self.requests.get(&id).ok_or(RequestError::NotFound(id))
    }

    /// Iterates requests in stable ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRequest> {
        self.requests.values()
    }

    /// IDs in stable order.
    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.keys().copied().collect()
    }

    /// Inserts a newly created request.
    pub fn insert(&mut self, request: ResourceRequest) -> Result<(), RequestError> {
        let id = request.id();
        if self.requests.contains_key(&id) {
            return Err(RequestError::DuplicateRequest(id));
        }
        self.requests.insert(id, request);
        self.version += 1;
        Ok(())
    }

    /// Puts a request in `waiting` status. See [`ResourceRequest::wait`].
    pub fn wait(&mut self, id: RequestId) -> Result<(), RequestError> {
        self.transition(id, |rq| rq.wait())
    }

    /// Grants a concrete resource to a request. See
    /// [`ResourceRequest::grant`].
    pub fn grant(&mut self, id: RequestId, resource: Resource) -> Result<(), RequestError> {
        self.transition(id, |rq| rq.grant(resource))
    }

    /// Requests release of a granted resource. See
    /// [`ResourceRequest::release`].
    pub fn release(&mut self, id: RequestId) -> Result<(), RequestError> {
        self.transition(id, |rq| rq.release())
    }

    /// Frees a releasing request's resource. See [`ResourceRequest::free`].
    pub fn free(&mut self, id: RequestId) -> Result<(), RequestError> {
        self.transition(id, |rq| rq.free())
    }

    /// Drives a request toward `released`. See [`ResourceRequest::cancel`].
    pub fn cancel(&mut self, id: RequestId) -> Result<(), RequestError> {
        self.transition(id, |rq| rq.cancel())
    }

    /// Cancels every request in the set.
    ///
    /// One failing request never prevents attempts on the others; failures
    /// are collected and returned for the caller to log.
    pub fn cancel_all(&mut self) -> Vec<(RequestId, RequestError)> {
        let mut failures = Vec::new();
        for id in self.ids() {
            if let Err(err) = self.cancel(id) {
                failures.push((id, err));
            }
        }
        failures
    }

    fn transition(
        &mut self,
        id: RequestId,
        op: impl FnOnce(&mut ResourceRequest) -> Result<(), RequestError>,
    ) -> Result<(), RequestError> {
        let rq = self.requests.get_mut(&id).ok_or(RequestError::NotFound(id))?;
        op(rq)?;
        self.version += 1;
        Ok(())
    }

    /// Serializes the set into its wire snapshot.
    pub fn to_snapshot(&self, stamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            requester_id: self.requester_id,
            stamp,
            requests: self.requests.values().map(RequestRecord::from).collect(),
        }
    }

    /// Folds a peer snapshot into this set.
    ///
    /// For IDs both sides know, the later status in the lifecycle order
    /// wins and a concrete resource is copied in once reported. IDs only
    /// the peer knows are inserted on the scheduler side when they arrive
    /// in an initial status; anything else unrecognized is either a stale
    /// echo of a purged request (ignored) or an anomaly (flagged). IDs only
    /// this side knows are left untouched — the peer simply has not seen
    /// them yet.
    ///
    /// Purging: a peer record in `released` status removes the local entry
    /// outright (the terminal status has round-tripped; there is nothing
    /// left to reconcile), and a locally `released` entry the peer no
    /// longer mentions has been purged on the far side and is dropped
    /// here too. Both rules keep the merge idempotent: re-delivering the
    /// same snapshot finds no entry and ignores the stale `released` echo.
    pub fn merge(&mut self, incoming: &Snapshot) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut mentioned = Vec::with_capacity(incoming.requests.len());

        for record in &incoming.requests {
            mentioned.push(record.id);

            if record.status == RequestStatus::Released {
                // Terminal and round-tripped; an unknown ID here is just a
                // stale echo of an entry already purged.
                if self.requests.remove(&record.id).is_some() {
                    outcome.changed = true;
                }
                continue;
            }

            match self.requests.get_mut(&record.id) {
                Some(local) => {
                    let mut copy_resource = false;
                    if local.resource.is_none() {
                        if let Some(granted) = record.resource.as_ref() {
                            if !local.descriptor.matches(granted) {
                                outcome.anomalies.push(MergeAnomaly {
                                    id: record.id,
                                    kind: AnomalyKind::ResourceMismatch,
                                    status: record.status,
                                });
                                continue;
                            }
                            copy_resource = true;
                        }
                    }

                    if record.status.rank() > local.status.rank() {
                        local.status = record.status;
                        outcome.changed = true;
                    }
                    if copy_resource {
                        local.resource = record.resource.clone();
                        outcome.changed = true;
                    }
                }
                None => match self.side {
                    SetSide::Scheduler if record.status.is_initial() => {
                        // An initial-status record carrying a mismatching
                        // resource is corrupt; never admit it.
                        let corrupt = record
                            .resource
                            .as_ref()
                            .is_some_and(|granted| !record.descriptor.matches(granted));
                        if corrupt {
                            outcome.anomalies.push(MergeAnomaly {
                                id: record.id,
                                kind: AnomalyKind::ResourceMismatch,
                                status: record.status,
                            });
                        } else {
                            self.requests.insert(record.id, record.to_request());
                            outcome.changed = true;
                        }
                    }
                    // A releasing status for an ID we no longer (or never)
                    // track is a stale echo of a purged request.
                    _ if record.status.is_closing() => {}
                    _ => {
                        outcome.anomalies.push(MergeAnomaly {
                            id: record.id,
                            kind: AnomalyKind::UnknownRequest,
                            status: record.status,
                        });
                    }
                },
            }
        }

        // The peer dropped these IDs after both sides reached released.
        let before = self.requests.len();
        self.requests
            .retain(|id, rq| rq.status() != RequestStatus::Released || mentioned.contains(id));
        if self.requests.len() != before {
            outcome.changed = true;
        }

        if outcome.changed {
            self.version += 1;
        }
        outcome
    }
}

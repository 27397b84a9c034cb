//! Scheduler-side resource pool.
//!
//! Tracks the concrete resources a scheduler owns and which request each
//! one is allocated to. The pool is mechanism only: [`ResourcePool::candidates`]
//! enumerates available resources matching a descriptor, and the choice
//! among them stays with the scheduler's policy callback.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::descriptor::{Resource, ResourceDescriptor};
use crate::ids::RequestId;

/// Errors from pool operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The resource is allocated to another request or has gone missing.
    #[error("resource not available: {0}")]
    NotAvailable(String),

    /// A release was attempted by a request that does not own the resource.
    #[error("resource {name} not owned by {request_id}")]
    NotOwned { name: String, request_id: RequestId },

    /// No resource with this canonical name in the pool.
    #[error("unknown resource: {0}")]
    UnknownResource(String),
}

/// Availability of one pooled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Free to allocate.
    Available,
    /// Assigned to a request.
    Allocated,
    /// Not currently reachable; cannot be allocated.
    Missing,
}

/// One concrete resource known to the scheduler.
#[derive(Debug, Clone)]
pub struct PoolResource {
    resource: Resource,
    status: PoolStatus,
    owner: Option<RequestId>,
}

impl PoolResource {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            status: PoolStatus::Available,
            owner: None,
        }
    }

    /// The concrete resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Current availability.
    pub fn status(&self) -> PoolStatus {
        self.status
    }

    /// The request this resource is allocated to, if any.
    pub fn owner(&self) -> Option<RequestId> {
        self.owner
    }
}

/// The set of concrete resources a scheduler arbitrates, keyed by canonical
/// name.
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    resources: BTreeMap<String, PoolResource>,
}

impl ResourcePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource, available for allocation. Re-adding a known
    /// resource leaves its current state alone.
    pub fn add(&mut self, resource: Resource) {
        self.resources
            .entry(resource.canonical_name())
            .or_insert_with(|| PoolResource::new(resource));
    }

    /// Number of resources in the pool.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Membership test by canonical name.
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Pool entry by canonical name.
    pub fn get(&self, name: &str) -> Option<&PoolResource> {
        self.resources.get(name)
    }

    /// Iterates pool entries in canonical-name order.
    pub fn iter(&self) -> impl Iterator<Item = &PoolResource> {
        self.resources.values()
    }

    /// Available resources matching the descriptor, in canonical-name
    /// order. Which candidate to grant is the policy callback's decision.
    pub fn candidates<'a>(
        &'a self,
        descriptor: &'a ResourceDescriptor,
    ) -> impl Iterator<Item = &'a Resource> {
        self.resources.values().filter_map(move |entry| {
            (entry.status == PoolStatus::Available && descriptor.matches(&entry.resource))
                .then_some(&entry.resource)
        })
    }

    /// Allocates a resource to a request.
    pub fn allocate(&mut self, name: &str, request_id: RequestId) -> Result<&Resource, PoolError> {
        let entry = self
            .resources
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownResource(name.to_string()))?;
        if entry.status != PoolStatus::Available {
            return Err(PoolError::NotAvailable(name.to_string()));
        }
        entry.status = PoolStatus::Allocated;
        entry.owner = Some(request_id);
        Ok(&entry.resource)
    }

    /// Releases a resource held by a request.
    ///
    /// A resource that went missing while allocated stays missing; it only
    /// loses its owner.
    pub fn release(&mut self, name: &str, request_id: RequestId) -> Result<(), PoolError> {
        let entry = self
            .resources
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownResource(name.to_string()))?;
        if entry.owner != Some(request_id) {
            return Err(PoolError::NotOwned {
                name: name.to_string(),
                request_id,
            });
        }
        entry.owner = None;
        if entry.status == PoolStatus::Allocated {
            entry.status = PoolStatus::Available;
        }
        Ok(())
    }

    /// Marks a resource unreachable.
    pub fn mark_missing(&mut self, name: &str) -> Result<(), PoolError> {
        let entry = self
            .resources
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownResource(name.to_string()))?;
        entry.status = PoolStatus::Missing;
        Ok(())
    }

    /// Marks a missing resource reachable again. An owned resource goes
    /// back to allocated, an unowned one to available.
    pub fn mark_available(&mut self, name: &str) -> Result<(), PoolError> {
        let entry = self
            .resources
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownResource(name.to_string()))?;
        entry.status = if entry.owner.is_some() {
            PoolStatus::Allocated
        } else {
            PoolStatus::Available
        };
        Ok(())
    }
}

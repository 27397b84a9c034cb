//! The per-request state machine.
//!
//! A [`ResourceRequest`] tracks one request through its lifecycle:
//!
//! ```text
//! new/reserved --wait()--> waiting --grant()--> granted
//!      \                     /                    |
//!       `---grant()---------'                 release()
//!                                                 |
//!              released <--free()-- releasing <---'
//! ```
//!
//! `cancel()` short-circuits from any non-terminal status toward `released`.
//! Transitions are synchronous, pure state updates; only the status (and,
//! for a grant, the resource field) ever change.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::descriptor::{Resource, ResourceDescriptor};
use crate::error::RequestError;
use crate::ids::RequestId;
use crate::status::RequestStatus;

/// One resource request, from either party's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub(crate) id: RequestId,
    pub(crate) status: RequestStatus,
    pub(crate) descriptor: ResourceDescriptor,
    pub(crate) priority: i32,
    pub(crate) reservation: Option<DateTime<Utc>>,
    pub(crate) hold_time: Option<Duration>,
    pub(crate) resource: Option<Resource>,
}

impl ResourceRequest {
    /// Creates a request in `new` status, to be satisfied as soon as
    /// possible.
    pub fn new(id: RequestId, descriptor: ResourceDescriptor, priority: i32) -> Self {
        Self {
            id,
            status: RequestStatus::New,
            descriptor,
            priority,
            reservation: None,
            hold_time: None,
            resource: None,
        }
    }

    /// Creates a request in `reserved` status for a future reservation time.
    pub fn reserved(
        id: RequestId,
        descriptor: ResourceDescriptor,
        priority: i32,
        reservation: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: RequestStatus::Reserved,
            descriptor,
            priority,
            reservation: Some(reservation),
            hold_time: None,
            resource: None,
        }
    }

    /// Attaches an estimate of how long the resource will be held.
    pub fn with_hold_time(mut self, hold_time: Duration) -> Self {
        self.hold_time = Some(hold_time);
        self
    }

    /// Request ID.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// The (possibly wildcarded) requested descriptor. Immutable after
    /// creation.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Scheduling priority; higher is more urgent.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Requested reservation time, if any. Absent means "as soon as
    /// possible".
    pub fn reservation(&self) -> Option<DateTime<Utc>> {
        self.reservation
    }

    /// Estimated hold time, if known.
    pub fn hold_time(&self) -> Option<Duration> {
        self.hold_time
    }

    /// The concrete resource assigned to this request, once granted.
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    /// Puts the request in `waiting` status until a suitable resource is
    /// available. Valid from `new` or `reserved`.
    pub fn wait(&mut self) -> Result<(), RequestError> {
        if !self.status.is_initial() {
            return Err(self.invalid("wait"));
        }
        self.status = RequestStatus::Waiting;
        Ok(())
    }

    /// Grants a specific concrete resource. Valid from `new` or `waiting`.
    ///
    /// The resource is validated against the requested descriptor before
    /// any state changes: a mismatching grant leaves the request untouched
    /// and returns [`RequestError::ResourceMismatch`].
    pub fn grant(&mut self, resource: Resource) -> Result<(), RequestError> {
        match self.status {
            RequestStatus::New | RequestStatus::Waiting => {}
            _ => return Err(self.invalid("grant")),
        }
        if !self.descriptor.matches(&resource) {
            return Err(RequestError::ResourceMismatch {
                granted: resource.canonical_name(),
                wanted: self.descriptor.to_string(),
            });
        }
        self.status = RequestStatus::Granted;
        self.resource = Some(resource);
        Ok(())
    }

    /// Releases a previously granted resource. Valid from `granted`.
    pub fn release(&mut self) -> Result<(), RequestError> {
        if self.status != RequestStatus::Granted {
            return Err(self.invalid("release"));
        }
        self.status = RequestStatus::Releasing;
        Ok(())
    }

    /// Frees up a resource whose release was requested. Valid from
    /// `releasing`.
    pub fn free(&mut self) -> Result<(), RequestError> {
        if self.status != RequestStatus::Releasing {
            return Err(self.invalid("free"));
        }
        self.status = RequestStatus::Released;
        Ok(())
    }

    /// Drives the request toward `released`: directly if nothing was
    /// granted yet, through `releasing` otherwise. Valid from any
    /// non-terminal status.
    pub fn cancel(&mut self) -> Result<(), RequestError> {
        self.status = match self.status {
            RequestStatus::New | RequestStatus::Reserved | RequestStatus::Waiting => {
                RequestStatus::Released
            }
            RequestStatus::Granted => RequestStatus::Releasing,
            // Already on its way out; nothing more to do.
            RequestStatus::Releasing => RequestStatus::Releasing,
            RequestStatus::Released => return Err(self.invalid("cancel")),
        };
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> RequestError {
        RequestError::InvalidTransition {
            operation,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wildcard_request() -> ResourceRequest {
        ResourceRequest::new(
            RequestId::random(),
            ResourceDescriptor::new("*", "precise", "ros", "segbot", "*"),
            0,
        )
    }

    fn roberto() -> Resource {
        Resource::new("linux", "precise", "ros", "segbot", "roberto")
    }

    #[test]
    fn test_new_request_defaults() {
        let rq = wildcard_request();
        assert_eq!(rq.status(), RequestStatus::New);
        assert_eq!(rq.priority(), 0);
        assert!(rq.reservation().is_none());
        assert!(rq.hold_time().is_none());
        assert!(rq.resource().is_none());
    }

    #[test]
    fn test_reserved_request() {
        let at = Utc::now() + chrono::TimeDelta::minutes(5);
        let rq = ResourceRequest::reserved(
            RequestId::random(),
            ResourceDescriptor::from(&roberto()),
            10,
            at,
        )
        .with_hold_time(Duration::from_secs(90));
        assert_eq!(rq.status(), RequestStatus::Reserved);
        assert_eq!(rq.reservation(), Some(at));
        assert_eq!(rq.hold_time(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_wait_from_initial_states() {
        let mut rq = wildcard_request();
        rq.wait().unwrap();
        assert_eq!(rq.status(), RequestStatus::Waiting);

        let mut rq = ResourceRequest::reserved(
            RequestId::random(),
            ResourceDescriptor::from(&roberto()),
            0,
            Utc::now(),
        );
        rq.wait().unwrap();
        assert_eq!(rq.status(), RequestStatus::Waiting);
    }

    #[test]
    fn test_wait_invalid_after_grant() {
        let mut rq = wildcard_request();
        rq.grant(roberto()).unwrap();
        assert_eq!(
            rq.wait(),
            Err(RequestError::InvalidTransition {
                operation: "wait",
                status: RequestStatus::Granted,
            })
        );
    }

    #[test]
    fn test_grant_from_waiting_sets_resource() {
        let mut rq = wildcard_request();
        rq.wait().unwrap();
        rq.grant(roberto()).unwrap();
        assert_eq!(rq.status(), RequestStatus::Granted);
        assert_eq!(rq.resource(), Some(&roberto()));
    }

    #[test]
    fn test_grant_mismatch_leaves_request_untouched() {
        let mut rq = ResourceRequest::new(
            RequestId::random(),
            ResourceDescriptor::new("*", "precise", "ros", "segbot", "*"),
            0,
        );
        rq.wait().unwrap();
        let wrong = Resource::new("linux", "precise", "other", "segbot", "roberto");
        let err = rq.grant(wrong).unwrap_err();
        assert!(matches!(err, RequestError::ResourceMismatch { .. }));
        assert_eq!(rq.status(), RequestStatus::Waiting);
        assert!(rq.resource().is_none());
    }

    #[test]
    fn test_release_then_free() {
        let mut rq = wildcard_request();
        rq.grant(roberto()).unwrap();
        rq.release().unwrap();
        assert_eq!(rq.status(), RequestStatus::Releasing);
        rq.free().unwrap();
        assert_eq!(rq.status(), RequestStatus::Released);
    }

    #[test]
    fn test_release_invalid_unless_granted() {
        let mut rq = wildcard_request();
        assert!(rq.release().is_err());
        rq.wait().unwrap();
        assert!(rq.release().is_err());
    }

    #[test]
    fn test_free_invalid_unless_releasing() {
        let mut rq = wildcard_request();
        assert!(rq.free().is_err());
        rq.grant(roberto()).unwrap();
        assert!(rq.free().is_err());
    }

    #[test]
    fn test_cancel_from_every_non_terminal_status() {
        let mut rq = wildcard_request();
        rq.cancel().unwrap();
        assert_eq!(rq.status(), RequestStatus::Released);

        let mut rq = wildcard_request();
        rq.wait().unwrap();
        rq.cancel().unwrap();
        assert_eq!(rq.status(), RequestStatus::Released);

        let mut rq = wildcard_request();
        rq.grant(roberto()).unwrap();
        rq.cancel().unwrap();
        assert_eq!(rq.status(), RequestStatus::Releasing);

        // Canceling while already releasing is a no-op.
        rq.cancel().unwrap();
        assert_eq!(rq.status(), RequestStatus::Releasing);
    }

    #[test]
    fn test_cancel_invalid_once_released() {
        let mut rq = wildcard_request();
        rq.cancel().unwrap();
        assert_eq!(
            rq.cancel(),
            Err(RequestError::InvalidTransition {
                operation: "cancel",
                status: RequestStatus::Released,
            })
        );
    }
}

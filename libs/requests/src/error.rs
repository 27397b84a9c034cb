//! Error types for the negotiation core.

use thiserror::Error;

use crate::ids::RequestId;
use crate::status::RequestStatus;

/// Errors from request transitions and set operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The operation is not valid from the request's current status.
    /// Always a caller/logic bug.
    #[error("invalid {operation}() transition, status = {status}")]
    InvalidTransition {
        operation: &'static str,
        status: RequestStatus,
    },

    /// A grant's concrete resource does not satisfy the requested
    /// descriptor. Signals a scheduler-side policy bug.
    #[error("resource {granted} does not match request {wanted}")]
    ResourceMismatch { granted: String, wanted: String },

    /// The request ID is already present in the set.
    #[error("duplicate request: {0}")]
    DuplicateRequest(RequestId),

    /// No request with this ID in the set.
    #[error("request not found: {0}")]
    NotFound(RequestId),
}

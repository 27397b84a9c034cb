//! Request status and the forward-progress order used by merge.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a resource request.
///
/// `New` and `Reserved` are the initial states, chosen by whether a future
/// reservation time was supplied at creation. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Just created, not yet acknowledged by the scheduler.
    New,
    /// Created with a future reservation time.
    Reserved,
    /// Queued until a suitable resource is available.
    Waiting,
    /// A concrete resource has been assigned.
    Granted,
    /// Release requested, resource not yet freed.
    Releasing,
    /// Resource freed; the request may be purged.
    Released,
}

impl RequestStatus {
    /// Position in the forward-progress total order used by merge.
    ///
    /// `New` and `Reserved` share a rank: both are initial, and neither is
    /// "ahead" of the other.
    pub fn rank(&self) -> u8 {
        match self {
            Self::New | Self::Reserved => 0,
            Self::Waiting => 1,
            Self::Granted => 2,
            Self::Releasing => 3,
            Self::Released => 4,
        }
    }

    /// Returns true for the initial states.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::New | Self::Reserved)
    }

    /// Returns true once the request is on its way out or gone.
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Releasing | Self::Released)
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Reserved => "reserved",
            Self::Waiting => "waiting",
            Self::Granted => "granted",
            Self::Releasing => "releasing",
            Self::Released => "released",
        };
        write!(f, "{}", s)
    }
}

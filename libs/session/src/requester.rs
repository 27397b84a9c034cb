//! Requester session loop.
//!
//! A [`Requester`] owns the requester-side [`RequestSet`] and keeps it in
//! sync with the scheduler: incoming feedback snapshots are merged, the
//! caller's feedback callback gets a chance to react, and the full set is
//! republished on change or on the heartbeat. The caller creates and
//! cancels requests through a [`RequesterHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use rsvp_requests::{
    RequestError, RequestId, RequestSet, RequesterId, ResourceDescriptor, ResourceRequest,
    SetSide, Snapshot,
};
use rsvp_transport::{feedback_topic, requests_topic, SnapshotTransport, TransportError};

use crate::config::SessionConfig;
use crate::SessionError;

/// Callback invoked with the request set after every merge that changed it.
///
/// The callback may drive transitions through the set's operations; any
/// change it makes is retransmitted immediately.
pub type FeedbackFn = Box<dyn FnMut(&mut RequestSet) + Send>;

/// Options for creating a new request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Scheduling priority; higher is more urgent.
    pub priority: i32,

    /// Reservation time. When set, the request starts in `reserved`.
    pub reservation: Option<DateTime<Utc>>,

    /// Estimated hold time, if known.
    pub hold_time: Option<Duration>,

    /// Request ID to use; a random one is generated when absent.
    pub id: Option<RequestId>,
}

/// Handle for creating and canceling requests while the session loop runs.
///
/// All access goes through the owning set's lock, so user-driven
/// transitions, merges, and heartbeats are serialized.
#[derive(Clone)]
pub struct RequesterHandle {
    requester_id: RequesterId,
    set: Arc<Mutex<RequestSet>>,
}

impl RequesterHandle {
    /// This requester's ID.
    pub fn requester_id(&self) -> RequesterId {
        self.requester_id
    }

    /// Adds a new request for the given descriptor.
    ///
    /// Returns the assigned request ID. The request goes out with the next
    /// transmission (immediately after a feedback-driven change, or on the
    /// heartbeat at the latest).
    pub async fn new_request(
        &self,
        descriptor: ResourceDescriptor,
        options: RequestOptions,
    ) -> Result<RequestId, RequestError> {
        let id = options.id.unwrap_or_else(RequestId::random);
        let mut request = match options.reservation {
            Some(at) => ResourceRequest::reserved(id, descriptor, options.priority, at),
            None => ResourceRequest::new(id, descriptor, options.priority),
        };
        if let Some(hold_time) = options.hold_time {
            request = request.with_hold_time(hold_time);
        }
        self.set.lock().await.insert(request)?;
        debug!(request_id = %id, "Request created");
        Ok(id)
    }

    /// Drives one request toward release.
    pub async fn cancel(&self, id: RequestId) -> Result<(), RequestError> {
        self.set.lock().await.cancel(id)
    }

    /// Cancels every outstanding request. One failing request never
    /// prevents attempts on the others; failures are logged and counted.
    pub async fn cancel_all(&self) -> usize {
        let failures = self.set.lock().await.cancel_all();
        for (id, err) in &failures {
            warn!(request_id = %id, error = %err, "Cancel failed, skipping");
        }
        failures.len()
    }

    /// Runs a closure against the current request set.
    ///
    /// Mutation is still funneled through the set's operations; the
    /// closure runs inside the session's critical section.
    pub async fn with_set<R>(&self, f: impl FnOnce(&mut RequestSet) -> R) -> R {
        let mut set = self.set.lock().await;
        f(&mut set)
    }
}

/// The requester-side session loop.
pub struct Requester<T: SnapshotTransport> {
    transport: Arc<T>,
    requester_id: RequesterId,
    set: Arc<Mutex<RequestSet>>,
    feedback: FeedbackFn,
    config: SessionConfig,
}

impl<T: SnapshotTransport> Requester<T> {
    /// Creates a requester session with a fresh random ID.
    pub fn new(transport: Arc<T>, config: SessionConfig, feedback: FeedbackFn) -> Self {
        Self::with_id(transport, config, feedback, RequesterId::random())
    }

    /// Creates a requester session with a caller-supplied ID.
    pub fn with_id(
        transport: Arc<T>,
        config: SessionConfig,
        feedback: FeedbackFn,
        requester_id: RequesterId,
    ) -> Self {
        let set = Arc::new(Mutex::new(RequestSet::new(SetSide::Requester, requester_id)));
        Self {
            transport,
            requester_id,
            set,
            feedback,
            config,
        }
    }

    /// This requester's ID.
    pub fn requester_id(&self) -> RequesterId {
        self.requester_id
    }

    /// Handle for creating and canceling requests while the loop runs.
    pub fn handle(&self) -> RequesterHandle {
        RequesterHandle {
            requester_id: self.requester_id,
            set: Arc::clone(&self.set),
        }
    }

    /// Runs the session loop until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        let sub_topic = feedback_topic(&self.config.namespace, self.requester_id);
        let pub_topic = requests_topic(&self.config.namespace);
        let mut feedback_rx = self.transport.subscribe(&sub_topic).await?;

        info!(
            requester_id = %self.requester_id,
            feedback_topic = %sub_topic,
            "Requester session started"
        );

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut sent_since_tick = false;

        loop {
            tokio::select! {
                received = feedback_rx.recv() => {
                    match received {
                        Some(snapshot) => {
                            if self.handle_feedback(snapshot, &pub_topic).await? {
                                sent_since_tick = true;
                            }
                        }
                        None => {
                            warn!(requester_id = %self.requester_id, "Feedback subscription closed");
                            return Err(SessionError::Transport(TransportError::Closed));
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if !sent_since_tick {
                        self.publish_current(&pub_topic).await?;
                    }
                    sent_since_tick = false;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(requester_id = %self.requester_id, "Requester session shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Merge + callback + conditional retransmit, as one critical section
    /// under the set's lock.
    ///
    /// Returns whether a snapshot was published.
    async fn handle_feedback(
        &mut self,
        snapshot: Snapshot,
        pub_topic: &str,
    ) -> Result<bool, SessionError> {
        let mut set = self.set.lock().await;
        let outcome = set.merge(&snapshot);
        for anomaly in &outcome.anomalies {
            warn!(requester_id = %self.requester_id, %anomaly, "Feedback anomaly");
        }
        if !outcome.changed {
            return Ok(false);
        }
        debug!(
            requester_id = %self.requester_id,
            requests = set.len(),
            "Feedback merged"
        );

        let version = set.version();
        (self.feedback)(&mut set);
        if set.version() == version {
            return Ok(false);
        }

        // The callback advanced something; let the scheduler know now
        // rather than waiting for the heartbeat.
        let snapshot = set.to_snapshot(Utc::now());
        self.transport.publish(pub_topic, &snapshot).await?;
        Ok(true)
    }

    async fn publish_current(&mut self, pub_topic: &str) -> Result<(), SessionError> {
        let snapshot = self.set.lock().await.to_snapshot(Utc::now());
        self.transport.publish(pub_topic, &snapshot).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsvp_requests::RequestStatus;
    use rsvp_transport::MemoryBus;

    fn wildcard() -> ResourceDescriptor {
        ResourceDescriptor::new("*", "precise", "ros", "segbot", "*")
    }

    fn requester() -> Requester<MemoryBus> {
        Requester::new(
            Arc::new(MemoryBus::new()),
            SessionConfig::default(),
            Box::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn test_new_request_assigns_id() {
        let handle = requester().handle();
        let id = handle
            .new_request(wildcard(), RequestOptions::default())
            .await
            .unwrap();
        let status = handle.with_set(|set| set.lookup(id).unwrap().status()).await;
        assert_eq!(status, RequestStatus::New);
    }

    #[tokio::test]
    async fn test_new_request_with_supplied_id_rejects_duplicates() {
        let handle = requester().handle();
        let id = RequestId::random();
        let options = RequestOptions {
            id: Some(id),
            ..Default::default()
        };
        assert_eq!(
            handle.new_request(wildcard(), options.clone()).await.unwrap(),
            id
        );
        assert_eq!(
            handle.new_request(wildcard(), options).await,
            Err(RequestError::DuplicateRequest(id))
        );
    }

    #[tokio::test]
    async fn test_reservation_starts_reserved() {
        let handle = requester().handle();
        let options = RequestOptions {
            reservation: Some(Utc::now() + chrono::TimeDelta::minutes(10)),
            ..Default::default()
        };
        let id = handle.new_request(wildcard(), options).await.unwrap();
        let status = handle.with_set(|set| set.lookup(id).unwrap().status()).await;
        assert_eq!(status, RequestStatus::Reserved);
    }

    #[tokio::test]
    async fn test_cancel_all_skips_failures() {
        let handle = requester().handle();
        let a = handle
            .new_request(wildcard(), RequestOptions::default())
            .await
            .unwrap();
        handle
            .new_request(wildcard(), RequestOptions::default())
            .await
            .unwrap();
        handle.cancel(a).await.unwrap();

        // `a` is already released; only it fails the sweep.
        assert_eq!(handle.cancel_all().await, 1);
    }
}

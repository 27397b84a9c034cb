//! Snapshot transport boundary.
//!
//! The negotiation core only needs two things from a transport: publish a
//! snapshot to a topic, and subscribe to a topic for incoming snapshots.
//! [`SnapshotTransport`] captures that boundary; the session loops are
//! generic over it.
//!
//! [`MemoryBus`] is the in-process implementation used by tests and the
//! simulator. Like the pub/sub systems it stands in for, it is lossy: a
//! subscriber that falls behind misses messages. The heartbeat retransmit
//! in the session layer is what makes that safe.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use rsvp_requests::{RequesterId, Snapshot};

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "rsvp";

/// Queue depth per subscriber.
const CHANNEL_DEPTH: usize = 16;

/// Shared topic on which all requesters publish toward the scheduler.
pub fn requests_topic(namespace: &str) -> String {
    format!("{}/requests", namespace)
}

/// Per-requester topic on which the scheduler publishes feedback.
pub fn feedback_topic(namespace: &str, requester_id: RequesterId) -> String {
    format!("{}/feedback/{}", namespace, requester_id)
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is shut down and can no longer deliver.
    #[error("transport closed")]
    Closed,
}

/// Asynchronous snapshot delivery.
///
/// Implementations may drop messages (full queues, network loss); the
/// protocol tolerates loss, duplication, and reordering.
#[async_trait]
pub trait SnapshotTransport: Send + Sync + 'static {
    /// Publishes a snapshot to a topic. Publishing to a topic with no
    /// subscribers is not an error.
    async fn publish(&self, topic: &str, snapshot: &Snapshot) -> Result<(), TransportError>;

    /// Subscribes to a topic, returning the receiving end of the
    /// subscription queue.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Snapshot>, TransportError>;
}

/// In-process pub/sub bus over bounded tokio channels.
#[derive(Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<Snapshot>>>>,
}

impl MemoryBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotTransport for MemoryBus {
    async fn publish(&self, topic: &str, snapshot: &Snapshot) -> Result<(), TransportError> {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        let Some(subscribers) = topics.get_mut(topic) else {
            return Ok(());
        };
        subscribers.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Lossy on backpressure; the next heartbeat covers the gap.
                warn!(topic, "Subscriber lagging, snapshot dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Snapshot>, TransportError> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        topics.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

//! Scheduler session loop.
//!
//! A [`Scheduler`] serves every requester publishing on the shared
//! requests topic. Each requester gets its own scheduler-side
//! [`RequestSet`]; incoming snapshots are merged into it and the policy
//! callback decides what to wait, grant, or free. Feedback goes back on
//! the requester's own topic.
//!
//! A watchdog drops requesters that stop heartbeating, so a crashed
//! client cannot pin scheduler state forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use rsvp_requests::{RequestSet, RequesterId, SetSide, Snapshot};
use rsvp_transport::{feedback_topic, requests_topic, SnapshotTransport, TransportError};

use crate::config::SessionConfig;
use crate::SessionError;

/// Policy callback, invoked with a requester's set after every merge that
/// changed it.
///
/// This is where resource selection lives: the callback inspects the set
/// and drives transitions (wait, grant, free) through its operations.
pub type PolicyFn = Box<dyn FnMut(RequesterId, &mut RequestSet) + Send>;

/// Per-requester scheduler state.
struct RequesterContext {
    set: RequestSet,
    feedback_topic: String,
    last_heard: Instant,
    sent_since_tick: bool,
}

/// The scheduler-side session loop.
pub struct Scheduler<T: SnapshotTransport> {
    transport: Arc<T>,
    policy: PolicyFn,
    config: SessionConfig,
    requesters: HashMap<RequesterId, RequesterContext>,
}

impl<T: SnapshotTransport> Scheduler<T> {
    /// Creates a scheduler session.
    pub fn new(transport: Arc<T>, config: SessionConfig, policy: PolicyFn) -> Self {
        Self {
            transport,
            policy,
            config,
            requesters: HashMap::new(),
        }
    }

    /// Number of requesters currently tracked.
    pub fn requester_count(&self) -> usize {
        self.requesters.len()
    }

    /// Runs the session loop until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        let topic = requests_topic(&self.config.namespace);
        let mut requests_rx = self.transport.subscribe(&topic).await?;

        info!(requests_topic = %topic, "Scheduler session started");

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                received = requests_rx.recv() => {
                    match received {
                        Some(snapshot) => self.handle_requests(snapshot).await?,
                        None => {
                            warn!("Requests subscription closed");
                            return Err(SessionError::Transport(TransportError::Closed));
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.tick().await?;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler session shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Merges one requester snapshot and answers with feedback.
    async fn handle_requests(&mut self, snapshot: Snapshot) -> Result<(), SessionError> {
        let requester_id = snapshot.requester_id;
        let namespace = &self.config.namespace;
        let created = !self.requesters.contains_key(&requester_id);
        let ctx = self
            .requesters
            .entry(requester_id)
            .or_insert_with(|| {
                info!(requester_id = %requester_id, "New requester");
                RequesterContext {
                    set: RequestSet::new(SetSide::Scheduler, requester_id),
                    feedback_topic: feedback_topic(namespace, requester_id),
                    last_heard: Instant::now(),
                    sent_since_tick: false,
                }
            });
        ctx.last_heard = Instant::now();

        let outcome = ctx.set.merge(&snapshot);
        for anomaly in &outcome.anomalies {
            warn!(requester_id = %requester_id, %anomaly, "Request snapshot anomaly");
        }

        let version = ctx.set.version();
        if outcome.changed {
            (self.policy)(requester_id, &mut ctx.set);
        }

        // Answer when the merge or the policy moved anything, and always
        // greet a requester we had not seen before.
        if created || outcome.changed || ctx.set.version() != version {
            debug!(
                requester_id = %requester_id,
                requests = ctx.set.len(),
                "Publishing feedback"
            );
            let feedback = ctx.set.to_snapshot(Utc::now());
            self.transport.publish(&ctx.feedback_topic, &feedback).await?;
            ctx.sent_since_tick = true;
        }
        Ok(())
    }

    /// Heartbeat: keep quiet requesters' views alive and evict dead ones.
    async fn tick(&mut self) -> Result<(), SessionError> {
        let window = self.config.liveness_window();
        self.requesters.retain(|requester_id, ctx| {
            if ctx.last_heard.elapsed() > window {
                warn!(
                    requester_id = %requester_id,
                    requests = ctx.set.len(),
                    "Requester timed out, dropping its requests"
                );
                false
            } else {
                true
            }
        });

        for ctx in self.requesters.values_mut() {
            if !ctx.sent_since_tick {
                let feedback = ctx.set.to_snapshot(Utc::now());
                self.transport.publish(&ctx.feedback_topic, &feedback).await?;
            }
            ctx.sent_since_tick = false;
        }
        Ok(())
    }
}

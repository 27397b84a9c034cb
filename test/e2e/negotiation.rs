//! End-to-end negotiation tests.
//!
//! Both session loops run against the in-memory bus with fast heartbeats,
//! and the tests observe convergence only through the public handles and
//! the wire — the same way a real deployment would.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p rsvp-e2e --test negotiation
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use rsvp_requests::{
    RequestId, RequestSet, RequestStatus, Resource, ResourceDescriptor, ResourcePool,
};
use rsvp_session::{FeedbackFn, PolicyFn, RequestOptions, Requester, RequesterHandle, Scheduler, SessionConfig};
use rsvp_transport::{feedback_topic, MemoryBus, SnapshotTransport};

fn fast_config() -> SessionConfig {
    SessionConfig {
        heartbeat_interval: Duration::from_millis(50),
        liveness_multiplier: 4,
        namespace: "test".to_string(),
    }
}

fn roberto() -> Resource {
    Resource::new("linux", "precise", "ros", "segbot", "roberto")
}

fn segbot_any() -> ResourceDescriptor {
    ResourceDescriptor::new("*", "precise", "ros", "segbot", "*")
}

fn pool_of(resources: &[Resource]) -> ResourcePool {
    let mut pool = ResourcePool::new();
    for resource in resources {
        pool.add(resource.clone());
    }
    pool
}

/// First-fit test policy: free releases first, then grant whatever fits.
fn first_fit(mut pool: ResourcePool) -> PolicyFn {
    Box::new(move |_requester_id, set| {
        for id in set.ids() {
            if set.get(id).map(|rq| rq.status()) != Some(RequestStatus::Releasing) {
                continue;
            }
            if let Some(name) = set
                .get(id)
                .and_then(|rq| rq.resource())
                .map(Resource::canonical_name)
            {
                pool.release(&name, id).expect("pool release");
            }
            set.free(id).expect("free");
        }

        for id in set.ids() {
            let Some(rq) = set.get(id) else { continue };
            if rq.status().is_initial() {
                set.wait(id).expect("wait");
            }
            if set.get(id).map(|rq| rq.status()) != Some(RequestStatus::Waiting) {
                continue;
            }
            let descriptor = set.get(id).map(|rq| rq.descriptor().clone()).unwrap();
            let candidate = pool
                .candidates(&descriptor)
                .next()
                .map(Resource::canonical_name);
            if let Some(name) = candidate {
                let resource = pool.allocate(&name, id).expect("allocate").clone();
                set.grant(id, resource).expect("grant");
            }
        }
    })
}

fn no_feedback() -> FeedbackFn {
    Box::new(|_| {})
}

struct Harness {
    bus: Arc<MemoryBus>,
    handle: RequesterHandle,
    shutdown_tx: watch::Sender<bool>,
    requester_shutdown_tx: watch::Sender<bool>,
}

/// Spawns a scheduler with the given pool and one requester with the given
/// feedback callback.
fn start(pool: ResourcePool, feedback: FeedbackFn) -> Harness {
    let bus = Arc::new(MemoryBus::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (requester_shutdown_tx, requester_shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(Arc::clone(&bus), fast_config(), first_fit(pool));
    tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let requester = Requester::new(Arc::clone(&bus), fast_config(), feedback);
    let handle = requester.handle();
    tokio::spawn(async move { requester.run(requester_shutdown_rx).await });

    Harness {
        bus,
        handle,
        shutdown_tx,
        requester_shutdown_tx,
    }
}

impl Harness {
    fn stop(&self) {
        let _ = self.requester_shutdown_tx.send(true);
        let _ = self.shutdown_tx.send(true);
    }
}

/// Polls the requester's set until the predicate holds.
async fn wait_until<F>(handle: &RequesterHandle, what: &str, mut predicate: F)
where
    F: FnMut(&RequestSet) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if handle.with_set(|set| predicate(set)).await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn status_of(handle: &RequesterHandle, id: RequestId) -> Option<RequestStatus> {
    handle.with_set(|set| set.get(id).map(|rq| rq.status())).await
}

#[tokio::test]
async fn test_full_negotiation_roundtrip() {
    let harness = start(pool_of(&[roberto()]), no_feedback());
    let handle = &harness.handle;

    let id = handle
        .new_request(segbot_any(), RequestOptions::default())
        .await
        .unwrap();

    wait_until(handle, "grant", |set| {
        set.get(id).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;

    let granted = handle
        .with_set(|set| set.lookup(id).unwrap().resource().cloned())
        .await
        .unwrap();
    assert_eq!(granted, roberto());

    // Cancel and wait for the release to round-trip and both purges to
    // land requester-side.
    handle.cancel(id).await.unwrap();
    wait_until(handle, "set drained", RequestSet::is_empty).await;

    harness.stop();
}

#[tokio::test]
async fn test_callback_release_triggers_full_cycle() {
    // The feedback callback releases as soon as it sees a grant; its
    // change must be retransmitted immediately, and the whole lifecycle
    // completes with no driver involvement.
    let feedback: FeedbackFn = Box::new(|set| {
        for id in set.ids() {
            if set.get(id).map(|rq| rq.status()) == Some(RequestStatus::Granted) {
                set.release(id).expect("release");
            }
        }
    });
    let harness = start(pool_of(&[roberto()]), feedback);
    let handle = &harness.handle;

    handle
        .new_request(segbot_any(), RequestOptions::default())
        .await
        .unwrap();

    wait_until(handle, "full cycle", RequestSet::is_empty).await;
    harness.stop();
}

#[tokio::test]
async fn test_second_request_queues_until_first_releases() {
    let harness = start(pool_of(&[roberto()]), no_feedback());
    let handle = &harness.handle;

    // Fixed IDs pin the set order, so the first request wins the race for
    // the single pooled resource.
    let first = RequestId::from_uuid(uuid_from(1));
    let second = RequestId::from_uuid(uuid_from(2));
    for id in [first, second] {
        handle
            .new_request(
                segbot_any(),
                RequestOptions {
                    id: Some(id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    wait_until(handle, "first granted", |set| {
        set.get(first).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;
    wait_until(handle, "second queued", |set| {
        set.get(second).map(|rq| rq.status()) == Some(RequestStatus::Waiting)
    })
    .await;
    assert_eq!(status_of(handle, first).await, Some(RequestStatus::Granted));

    // Freeing the contended resource lets the queued request through.
    handle.cancel(first).await.unwrap();
    wait_until(handle, "second granted", |set| {
        set.get(second).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;

    handle.cancel_all().await;
    wait_until(handle, "set drained", RequestSet::is_empty).await;
    harness.stop();
}

#[tokio::test]
async fn test_heartbeat_keeps_idle_requester_alive() {
    let harness = start(pool_of(&[roberto()]), no_feedback());
    let handle = &harness.handle;

    let id = handle
        .new_request(segbot_any(), RequestOptions::default())
        .await
        .unwrap();
    wait_until(handle, "grant", |set| {
        set.get(id).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;

    // Stay idle well past the liveness window. Only the heartbeats speak
    // for us; if the scheduler dropped this requester, the release below
    // would never be freed.
    tokio::time::sleep(fast_config().liveness_window() * 3).await;

    handle.cancel(id).await.unwrap();
    wait_until(handle, "release after idle period", RequestSet::is_empty).await;
    harness.stop();
}

#[tokio::test]
async fn test_duplicate_feedback_delivery_is_harmless() {
    let harness = start(pool_of(&[roberto()]), no_feedback());
    let handle = &harness.handle;

    let id = handle
        .new_request(segbot_any(), RequestOptions::default())
        .await
        .unwrap();
    wait_until(handle, "grant", |set| {
        set.get(id).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;

    // Capture a post-grant feedback snapshot off the wire and redeliver it
    // several times; the duplicates must not move the set at all.
    let topic = feedback_topic("test", handle.requester_id());
    let mut probe = harness.bus.subscribe(&topic).await.unwrap();
    let snapshot = probe.recv().await.unwrap();

    let version_before = handle.with_set(|set| set.version()).await;
    for _ in 0..3 {
        harness.bus.publish(&topic, &snapshot).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.with_set(|set| set.version()).await, version_before);
    assert_eq!(status_of(handle, id).await, Some(RequestStatus::Granted));

    harness.stop();
}

#[tokio::test]
async fn test_watchdog_evicts_silent_requester() {
    let harness = start(pool_of(&[roberto()]), no_feedback());
    let handle = &harness.handle;

    let id = handle
        .new_request(segbot_any(), RequestOptions::default())
        .await
        .unwrap();
    wait_until(handle, "grant", |set| {
        set.get(id).map(|rq| rq.status()) == Some(RequestStatus::Granted)
    })
    .await;

    let topic = feedback_topic("test", handle.requester_id());
    let mut probe = harness.bus.subscribe(&topic).await.unwrap();

    // Stop only the requester; its heartbeats cease.
    harness.requester_shutdown_tx.send(true).unwrap();
    tokio::time::sleep(fast_config().liveness_window() * 3).await;

    // Eviction has happened by now; drain the backlog and verify the
    // scheduler no longer republishes feedback for this requester.
    while probe.try_recv().is_ok() {}
    tokio::time::sleep(fast_config().heartbeat_interval * 4).await;
    assert!(
        probe.try_recv().is_err(),
        "scheduler kept publishing feedback after eviction"
    );

    harness.stop();
}

fn uuid_from(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

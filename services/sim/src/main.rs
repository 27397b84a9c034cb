//! RSVP negotiation simulator.
//!
//! Runs a scheduler and a requester in one process, wired over the
//! in-memory bus, and walks a couple of requests through the full
//! lifecycle: new -> waiting -> granted -> releasing -> released.
//!
//! ## Architecture
//!
//! - **Scheduler task**: first-fit policy over a small built-in resource
//!   pool
//! - **Requester task**: merges feedback and logs every status change
//! - **Demo driver**: creates requests, waits for grants, holds, cancels

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rsvp_requests::{
    RequestId, RequestSet, RequestStatus, Resource, ResourceDescriptor, ResourcePool,
};
use rsvp_session::{
    FeedbackFn, PolicyFn, RequestOptions, Requester, RequesterHandle, Scheduler,
};
use rsvp_transport::MemoryBus;

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RSVP negotiation simulator");

    let config = config::Config::from_env()?;
    info!(
        namespace = %config.namespace,
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let bus = Arc::new(MemoryBus::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Scheduler task with a first-fit policy over the demo pool
    let scheduler = Scheduler::new(
        Arc::clone(&bus),
        config.session(),
        first_fit_policy(demo_pool()),
    );
    let scheduler_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    // Requester task
    let requester = Requester::new(Arc::clone(&bus), config.session(), log_feedback());
    let handle = requester.handle();
    let requester_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { requester.run(shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = run_demo(handle, config.hold) => {
            match result {
                Ok(()) => info!("Demo scenario finished"),
                Err(e) => error!(error = %e, "Demo scenario failed"),
            }
        }
    }

    // Signal shutdown to both session loops
    let _ = shutdown_tx.send(true);
    for (name, task) in [("scheduler", scheduler_task), ("requester", requester_task)] {
        match task.await {
            Ok(Ok(())) => info!(task = name, "Session exited cleanly"),
            Ok(Err(e)) => error!(task = name, error = %e, "Session error"),
            Err(e) => error!(task = name, error = %e, "Session task panicked"),
        }
    }

    info!("Simulator shutdown complete");
    Ok(())
}

/// The concrete resources the demo scheduler arbitrates.
fn demo_pool() -> ResourcePool {
    let mut pool = ResourcePool::new();
    pool.add(Resource::new("linux", "precise", "ros", "segbot", "roberto"));
    pool.add(Resource::new("linux", "precise", "ros", "segbot", "marge"));
    pool.add(Resource::new("linux", "precise", "ros", "turtlebot", "marvin"));
    pool
}

/// First-fit policy: queue incoming requests, grant the first available
/// candidate, free pool entries as releases come in.
///
/// Releases are processed before grants so a resource freed in this pass
/// can satisfy a waiting request in the same pass.
fn first_fit_policy(mut pool: ResourcePool) -> PolicyFn {
    Box::new(move |requester_id, set| {
        for id in set.ids() {
            if set.get(id).map(|rq| rq.status()) != Some(RequestStatus::Releasing) {
                continue;
            }
            let name = set
                .get(id)
                .and_then(|rq| rq.resource())
                .map(Resource::canonical_name);
            if let Some(name) = name {
                if let Err(err) = pool.release(&name, id) {
                    warn!(request_id = %id, error = %err, "Pool release failed");
                }
            }
            match set.free(id) {
                Ok(()) => info!(requester_id = %requester_id, request_id = %id, "Resource freed"),
                Err(err) => warn!(request_id = %id, error = %err, "Free failed, skipping"),
            }
        }

        for id in set.ids() {
            let Some(rq) = set.get(id) else { continue };
            match rq.status() {
                RequestStatus::New | RequestStatus::Reserved => {
                    if let Err(err) = set.wait(id) {
                        warn!(request_id = %id, error = %err, "Wait failed, skipping");
                        continue;
                    }
                    try_grant(&mut pool, set, id);
                }
                RequestStatus::Waiting => try_grant(&mut pool, set, id),
                _ => {}
            }
        }
    })
}

fn try_grant(pool: &mut ResourcePool, set: &mut RequestSet, id: RequestId) {
    let Some(descriptor) = set.get(id).map(|rq| rq.descriptor().clone()) else {
        return;
    };
    let Some(name) = pool
        .candidates(&descriptor)
        .next()
        .map(Resource::canonical_name)
    else {
        info!(request_id = %id, descriptor = %descriptor, "No candidate available, leaving in queue");
        return;
    };

    let resource = match pool.allocate(&name, id) {
        Ok(resource) => resource.clone(),
        Err(err) => {
            warn!(request_id = %id, resource = %name, error = %err, "Allocation failed");
            return;
        }
    };
    match set.grant(id, resource.clone()) {
        Ok(()) => info!(request_id = %id, resource = %resource, "Granted"),
        Err(err) => {
            error!(request_id = %id, error = %err, "Grant failed, returning resource to pool");
            if let Err(err) = pool.release(&name, id) {
                warn!(resource = %name, error = %err, "Pool release failed");
            }
        }
    }
}

/// Requester feedback callback: log every request as feedback arrives.
fn log_feedback() -> FeedbackFn {
    Box::new(|set| {
        for rq in set.iter() {
            match rq.resource() {
                Some(resource) => info!(
                    request_id = %rq.id(),
                    status = %rq.status(),
                    resource = %resource,
                    "Feedback"
                ),
                None => info!(request_id = %rq.id(), status = %rq.status(), "Feedback"),
            }
        }
    })
}

/// The scripted negotiation: request two resources (one wildcarded), wait
/// for both grants, hold, then cancel everything and wait for the release
/// round-trip.
async fn run_demo(handle: RequesterHandle, hold: Duration) -> Result<()> {
    let segbot = handle
        .new_request(
            ResourceDescriptor::new("*", "precise", "ros", "segbot", "*"),
            RequestOptions::default(),
        )
        .await?;
    let marvin = handle
        .new_request(
            ResourceDescriptor::new("linux", "precise", "ros", "turtlebot", "marvin"),
            RequestOptions {
                priority: 10,
                hold_time: Some(hold),
                ..Default::default()
            },
        )
        .await?;

    wait_for_status(&handle, segbot, RequestStatus::Granted).await?;
    wait_for_status(&handle, marvin, RequestStatus::Granted).await?;
    info!("All requests granted, holding");
    tokio::time::sleep(hold).await;

    handle.cancel_all().await;
    wait_until_empty(&handle).await?;
    info!("All requests released and purged");
    Ok(())
}

async fn wait_for_status(
    handle: &RequesterHandle,
    id: RequestId,
    wanted: RequestStatus,
) -> Result<()> {
    let poll = async {
        loop {
            let status = handle.with_set(|set| set.get(id).map(|rq| rq.status())).await;
            if status == Some(wanted) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(30), poll)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for {id} to reach {wanted}"))
}

async fn wait_until_empty(handle: &RequesterHandle) -> Result<()> {
    let poll = async {
        loop {
            if handle.with_set(|set| set.is_empty()).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(30), poll)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for the request set to drain"))
}

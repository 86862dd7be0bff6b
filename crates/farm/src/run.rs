//! Wiring a scheduler and its workers from a [`FarmConfig`].

use std::sync::Arc;
use std::time::Duration;

use taskfarm_core::{Aggregator, DigestWorkload, FarmConfig, Task, Workload};
use taskfarm_wire::{
    cluster, FrameCodec, Transport, WorkerChannel, WorkerId, ZmqCoordinatorLink, ZmqWorkerLink,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::FarmError;
use crate::scheduler::{RunReport, Scheduler};
use crate::worker::{WorkerLoop, WorkerSummary};

fn workload(config: &FarmConfig) -> Arc<dyn Workload> {
    Arc::new(DigestWorkload {
        rounds: config.workload.rounds,
    })
}

fn zmq_transport(config: &FarmConfig) -> Result<Transport, FarmError> {
    Transport::from_config(&config.transport).ok_or_else(|| {
        FarmError::Config("transport.kind must be \"ipc\" or \"tcp\" for multi-process runs".into())
    })
}

/// Run the scheduler and `workers.count` worker loops in this process.
///
/// A worker that fails or panics ends the run with its error.
pub async fn run_local<A: Aggregator>(
    config: &FarmConfig,
    aggregator: A,
) -> Result<RunReport<A::Output>, FarmError> {
    config.validate()?;
    let capacity = config.channel.batch_capacity;
    let (channel, ends) = cluster(config.workers.count, FrameCodec::for_batch(capacity));

    let workload = workload(config);
    let mut workers = JoinSet::new();
    for end in ends {
        let branching = config.branching.build(end.id().0);
        let worker = WorkerLoop::new(end, Arc::clone(&workload), branching, capacity);
        workers.spawn(worker.run());
    }

    let mut scheduler = Scheduler::new(channel, aggregator, capacity);
    scheduler.seed(Task::seeds(&config.tree)?);

    let mut summaries = Vec::new();
    let scheduler_run = scheduler.run();
    tokio::pin!(scheduler_run);
    let outcome = loop {
        tokio::select! {
            outcome = &mut scheduler_run => break outcome,
            Some(joined) = workers.join_next() => summaries.push(joined??),
        }
    };
    let mut report = outcome?;

    while let Some(joined) = workers.join_next().await {
        summaries.push(joined??);
    }
    summaries.sort_by_key(|s| s.worker);
    report.workers = summaries;
    Ok(report)
}

/// Run only the scheduler, serving workers that connect over ZeroMQ.
pub async fn run_coordinator<A: Aggregator>(
    config: &FarmConfig,
    aggregator: A,
) -> Result<RunReport<A::Output>, FarmError> {
    config.validate()?;
    let transport = zmq_transport(config)?;
    let capacity = config.channel.batch_capacity;
    let hello_timeout = Duration::from_secs(config.transport.hello_timeout_secs);

    info!(endpoint = %transport, workers = config.workers.count, "waiting for workers");
    let channel = ZmqCoordinatorLink::bind(
        &transport,
        config.workers.count,
        FrameCodec::for_batch(capacity),
        hello_timeout,
    )
    .await?;

    let mut scheduler = Scheduler::new(channel, aggregator, capacity);
    scheduler.seed(Task::seeds(&config.tree)?);
    scheduler.run().await
}

/// Run a single worker of rank `worker` against a ZeroMQ coordinator.
pub async fn run_worker(config: &FarmConfig, worker: u32) -> Result<WorkerSummary, FarmError> {
    config.validate()?;
    if worker >= config.workers.count {
        return Err(FarmError::Config(format!(
            "worker rank {worker} out of range 0..{}",
            config.workers.count
        )));
    }
    let transport = zmq_transport(config)?;
    let capacity = config.channel.batch_capacity;
    let id = WorkerId(worker);
    let timeout = Duration::from_secs(config.transport.hello_timeout_secs);

    let link = ZmqWorkerLink::connect(&transport, id, timeout).await?;
    let channel = WorkerChannel::new(id, FrameCodec::for_batch(capacity), link);
    let summary = WorkerLoop::new(channel, workload(config), config.branching.build(worker), capacity)
        .run()
        .await;
    if let Err(e) = &summary {
        warn!(worker, error = %e, "worker stopped");
    }
    summary
}

//! Master scheduler: owns the task queue and the worker slots.
//!
//! The scheduler is a single event loop. Each iteration:
//!
//! 1. **Dispatch** queued tasks, FIFO, to available workers in ascending rank.
//! 2. **Terminate** if the queue is empty and every worker is available.
//! 3. **Wait** on the pending receives of all busy workers.
//! 4. **Ingest** every completed report: aggregate its outcome, append its
//!    children to the back of the queue, free the slot, re-post a receive.
//!
//! Exactly one receive is pending per busy worker at all times, so a worker's
//! report can never be matched against another worker's slot.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskfarm_core::{Aggregator, Task};
use taskfarm_wire::{
    Completion, CoordinatorChannel, Directive, RecvHandle, Report, SendHandle, WorkerId,
};
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use crate::error::FarmError;
use crate::slot::WorkerSlot;
use crate::stats::SchedulerStats;
use crate::worker::WorkerSummary;

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<T> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Finalized aggregator output.
    pub result: T,
    pub stats: SchedulerStats,
    /// Per-worker summaries, when the workers ran in this process.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<WorkerSummary>,
}

pub struct Scheduler<A> {
    channel: CoordinatorChannel,
    aggregator: A,
    capacity: u32,
    queue: VecDeque<Task>,
    slots: BTreeMap<WorkerId, WorkerSlot>,
    /// Assignment sends not yet known to be flushed.
    in_flight: Vec<SendHandle>,
    stats: SchedulerStats,
}

impl<A: Aggregator> Scheduler<A> {
    /// `capacity` is the maximum number of children one report may carry.
    pub fn new(channel: CoordinatorChannel, aggregator: A, capacity: u32) -> Self {
        let slots = channel
            .workers()
            .iter()
            .map(|&w| (w, WorkerSlot::default()))
            .collect();
        Self {
            channel,
            aggregator,
            capacity,
            queue: VecDeque::new(),
            slots,
            in_flight: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Append seed tasks to the queue. Must be called before [`run`](Self::run).
    pub fn seed(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.queue.extend(tasks);
        self.stats.observe_queue(self.queue.len());
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn slots(&self) -> &BTreeMap<WorkerId, WorkerSlot> {
        &self.slots
    }

    /// Drive the run to termination and finalize the aggregator.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> Result<RunReport<A::Output>, FarmError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, workers = self.slots.len(), seeds = self.queue.len(), "scheduler starting");

        if self.slots.is_empty() && !self.queue.is_empty() {
            return Err(FarmError::Config("no workers to run the seed tasks".into()));
        }

        self.prime()?;
        loop {
            self.dispatch()?;
            self.check_invariants()?;

            if self.is_drained() {
                self.terminate().await?;
                break;
            }

            let awaited = self.awaited();
            let completions = self.channel.wait_some(&awaited).await?;
            self.stats.record_wait(completions.len());
            if completions.is_empty() {
                debug!(awaited = awaited.len(), "wait returned no completions, waiting again");
                continue;
            }
            for completion in completions {
                self.ingest(completion)?;
            }
            self.reject_unsolicited()?;
            self.reap_sends();
        }

        let finished_at = Utc::now();
        info!(
            %run_id,
            reports = self.stats.reports,
            failures = self.stats.failures,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "scheduler finished"
        );
        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            result: self.aggregator.finalize(),
            stats: self.stats,
            workers: Vec::new(),
        })
    }

    /// Post one receive per worker before anything is dispatched.
    fn prime(&mut self) -> Result<(), FarmError> {
        for (&worker, slot) in self.slots.iter_mut() {
            if slot.pending_receive.is_none() {
                slot.pending_receive = Some(self.channel.recv_async(worker)?);
            }
        }
        debug!(posted = self.channel.posted_len(), "receives primed");
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), FarmError> {
        while !self.queue.is_empty() {
            let Some(worker) = self.next_available() else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.assign(worker, task)?;
        }
        Ok(())
    }

    fn next_available(&self) -> Option<WorkerId> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.available)
            .map(|(&worker, _)| worker)
    }

    fn assign(&mut self, worker: WorkerId, task: Task) -> Result<(), FarmError> {
        let slot = self
            .slots
            .get_mut(&worker)
            .ok_or_else(|| FarmError::ProtocolViolation(format!("dispatch to unknown worker {worker}")))?;
        if !slot.available {
            return Err(FarmError::ProtocolViolation(format!(
                "dispatch to busy worker {worker}"
            )));
        }
        if slot.pending_receive.is_none() {
            slot.pending_receive = Some(self.channel.recv_async(worker)?);
        }
        trace!(worker = %worker, depth = task.depth, payload = ?task.payload, "assign");
        let payload = task.payload;
        let send = self.channel.send_async(worker, &Directive::Assignment(task))?;
        slot.available = false;
        slot.assigned = Some(payload);
        self.in_flight.push(send);
        self.stats.record_dispatch(worker);
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.slots.values().all(|slot| slot.available)
    }

    /// Pending receives of every busy worker, in rank order.
    fn awaited(&self) -> Vec<RecvHandle> {
        self.slots.values().filter_map(WorkerSlot::awaited).collect()
    }

    fn ingest(&mut self, completion: Completion) -> Result<(), FarmError> {
        let Completion {
            handle,
            source,
            frame,
        } = completion;
        let slot = self.slots.get_mut(&source).ok_or_else(|| {
            FarmError::ProtocolViolation(format!("completion from unknown worker {source}"))
        })?;
        if slot.available {
            return Err(FarmError::ProtocolViolation(format!(
                "completion for idle worker {source}"
            )));
        }
        if slot.pending_receive != Some(handle) {
            return Err(FarmError::ProtocolViolation(format!(
                "completion {handle:?} does not match pending receive {:?} of worker {source}",
                slot.pending_receive
            )));
        }

        let report: Report = self.channel.codec().decode(&frame)?;
        report
            .validate(self.capacity)
            .map_err(|e| FarmError::ProtocolViolation(format!("worker {source}: {e}")))?;
        if slot.assigned != Some(report.answers) {
            return Err(FarmError::ProtocolViolation(format!(
                "worker {source} answered {:?}, was assigned {:?}",
                report.answers, slot.assigned
            )));
        }

        self.aggregator.ingest(&report.outcome);
        self.stats.record_report(&report);
        debug!(worker = %source, children = report.count, queue = self.queue.len(), "report");
        self.queue.extend(report.children);
        self.stats.observe_queue(self.queue.len());

        slot.available = true;
        slot.assigned = None;
        slot.pending_receive = Some(self.channel.recv_async(source)?);
        Ok(())
    }

    /// An idle worker has nothing to report; a frame buffered for one is
    /// a duplicate or stray report.
    fn reject_unsolicited(&self) -> Result<(), FarmError> {
        for (&worker, slot) in &self.slots {
            let buffered = self.channel.buffered(worker);
            if slot.available && buffered > 0 {
                return Err(FarmError::ProtocolViolation(format!(
                    "worker {worker} sent {buffered} report(s) while idle"
                )));
            }
        }
        Ok(())
    }

    /// Drop assignment sends the link has already flushed.
    fn reap_sends(&mut self) {
        self.in_flight.retain_mut(|send| !send.is_complete());
    }

    /// Withdraw the idle receives, tell every worker to exit, and wait until
    /// every outstanding send has been flushed.
    async fn terminate(&mut self) -> Result<(), FarmError> {
        for slot in self.slots.values_mut() {
            if let Some(handle) = slot.pending_receive.take() {
                self.channel.cancel(handle);
            }
        }
        let broadcast = self.channel.broadcast(&Directive::Terminate)?;
        info!(workers = broadcast.len(), dispatched = self.stats.dispatched, "terminating workers");
        for send in self.in_flight.drain(..).chain(broadcast) {
            send.wait().await?;
        }
        Ok(())
    }

    /// Check that slots and posted receives agree.
    ///
    /// Every busy slot holds exactly one pending receive, and the channel's
    /// posted receives are exactly the slots' pending ones.
    pub fn check_invariants(&self) -> Result<(), FarmError> {
        let mut pending = 0;
        for (&worker, slot) in &self.slots {
            if slot.is_busy() && slot.pending_receive.is_none() {
                return Err(FarmError::ProtocolViolation(format!(
                    "busy worker {worker} has no pending receive"
                )));
            }
            if self.channel.posted_for(worker) != slot.pending_receive {
                return Err(FarmError::ProtocolViolation(format!(
                    "worker {worker}: slot holds {:?}, channel holds {:?}",
                    slot.pending_receive,
                    self.channel.posted_for(worker)
                )));
            }
            pending += usize::from(slot.pending_receive.is_some());
        }
        if self.channel.posted_len() != pending {
            return Err(FarmError::ProtocolViolation(format!(
                "{} receives posted, {pending} held by slots",
                self.channel.posted_len()
            )));
        }
        Ok(())
    }
}

//! Dynamic task farm: a coordinator schedules a growing queue of tasks over
//! a fixed pool of workers, which report results and spawn child tasks.

pub mod error;
pub mod reference;
pub mod run;
pub mod scheduler;
pub mod slot;
pub mod stats;
pub mod worker;

pub use error::FarmError;
pub use reference::run_sequential;
pub use run::{run_coordinator, run_local, run_worker};
pub use scheduler::{RunReport, Scheduler};
pub use slot::WorkerSlot;
pub use stats::SchedulerStats;
pub use worker::{WorkerLoop, WorkerSummary};

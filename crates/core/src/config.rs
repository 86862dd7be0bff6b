//! Farm configuration.
//!
//! Parsed from `taskfarm.toml` with `TASKFARM_<SECTION>_<KEY>` environment
//! overrides. Only the effect of these settings (seed generation, branching
//! bounds, worker count, frame capacity) is part of the scheduling contract.

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::{
    ChannelConfig, FarmConfig, TransportConfig, TransportKind, TreeConfig, WorkersConfig,
    WorkloadConfig,
};

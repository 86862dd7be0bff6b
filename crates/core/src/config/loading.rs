use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::branching::BranchingKind;
use crate::error::CoreError;

use super::types::{FarmConfig, TransportKind};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

impl FarmConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Built-in defaults plus environment overrides, for runs without a file.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Print a one-line-per-section summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            seeds = self.tree.seeds,
            depth = self.tree.depth,
            min_children = self.tree.min_children,
            max_children = self.tree.max_children,
            p = self.tree.branch_probability,
            instance = %self.tree.instance,
            "tree"
        );
        tracing::info!(branching = ?self.branching, rounds = self.workload.rounds, "execution");
        tracing::info!(
            kind = ?self.transport.kind,
            workers = self.workers.count,
            batch_capacity = self.channel.batch_capacity,
            "transport"
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `TASKFARM_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `TASKFARM_TREE_DEPTH` -> `tree.depth`
    /// - `TASKFARM_TRANSPORT_KIND` -> `transport.kind`
    /// - `TASKFARM_WORKERS_COUNT` -> `workers.count`
    /// - `TASKFARM_BRANCHING_SEED` -> switches to seeded branching with that seed
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("TASKFARM_TREE_SEEDS") {
            self.tree.seeds = v;
        }
        if let Some(v) = env_parse("TASKFARM_TREE_DEPTH") {
            self.tree.depth = v;
        }
        if let Some(v) = env_parse("TASKFARM_TREE_MIN_CHILDREN") {
            self.tree.min_children = v;
        }
        if let Some(v) = env_parse("TASKFARM_TREE_MAX_CHILDREN") {
            self.tree.max_children = v;
        }
        if let Some(v) = env_parse("TASKFARM_TREE_BRANCH_PROBABILITY") {
            self.tree.branch_probability = v;
        }
        if let Some(v) = env_opt("TASKFARM_TREE_INSTANCE") {
            self.tree.instance = v;
        }
        if let Some(seed) = env_parse("TASKFARM_BRANCHING_SEED") {
            self.branching = BranchingKind::Seeded { seed };
        }
        if let Some(v) = env_parse("TASKFARM_WORKLOAD_ROUNDS") {
            self.workload.rounds = v;
        }
        if let Some(v) = env_parse("TASKFARM_CHANNEL_BATCH_CAPACITY") {
            self.channel.batch_capacity = v;
        }
        if let Some(v) = env_parse::<TransportKind>("TASKFARM_TRANSPORT_KIND") {
            self.transport.kind = v;
        }
        if let Some(v) = env_opt("TASKFARM_TRANSPORT_HOST") {
            self.transport.host = v;
        }
        if let Some(v) = env_parse("TASKFARM_TRANSPORT_PORT") {
            self.transport.port = v;
        }
        if let Some(v) = env_opt("TASKFARM_TRANSPORT_IPC_NAME") {
            self.transport.ipc_name = v;
        }
        if let Some(v) = env_parse("TASKFARM_WORKERS_COUNT") {
            self.workers.count = v;
        }
    }
}

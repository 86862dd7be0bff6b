use serde::{Deserialize, Serialize};

use crate::branching::BranchingKind;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for a farm run: problem shape, branching, transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Seed task generation.
    #[serde(default)]
    pub tree: TreeConfig,

    /// Child-count decision rule used by workers.
    #[serde(default)]
    pub branching: BranchingKind,

    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Fixed-size message settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub workers: WorkersConfig,
}

// ── Section configs ─────────────────────────────────────────────────

/// Seed tasks and per-task branching bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Number of seed tasks placed in the queue before any execution.
    #[serde(default = "default_seeds")]
    pub seeds: u32,

    /// Maximum subdivision depth of the seed tasks.
    #[serde(default = "default_depth")]
    pub depth: u32,

    #[serde(default = "default_min_children")]
    pub min_children: u32,

    #[serde(default = "default_max_children")]
    pub max_children: u32,

    /// Chance a non-terminal task produces any children.
    #[serde(default = "default_branch_probability")]
    pub branch_probability: f64,

    /// Identifies the problem instance; seed payloads are derived from it.
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_seeds() -> u32 {
    1
}

fn default_depth() -> u32 {
    8
}

fn default_min_children() -> u32 {
    1
}

fn default_max_children() -> u32 {
    4
}

fn default_branch_probability() -> f64 {
    0.6
}

fn default_instance() -> String {
    "default".into()
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            seeds: default_seeds(),
            depth: default_depth(),
            min_children: default_min_children(),
            max_children: default_max_children(),
            branch_probability: default_branch_probability(),
            instance: default_instance(),
        }
    }
}

/// Payload computation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Hash rounds per task (compute granularity).
    #[serde(default = "default_rounds")]
    pub rounds: u32,
}

fn default_rounds() -> u32 {
    1
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
        }
    }
}

/// Fixed-size message settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Maximum child tasks carried by one report (`Nmax`). Frames are sized
    /// for this many children so no length negotiation is needed.
    #[serde(default = "default_batch_capacity")]
    pub batch_capacity: u32,
}

fn default_batch_capacity() -> u32 {
    8
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            batch_capacity: default_batch_capacity(),
        }
    }
}

/// How coordinator and workers reach each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process tokio channels; workers are tasks of the coordinator process.
    #[default]
    Local,
    /// ZeroMQ over Unix domain sockets.
    Ipc,
    /// ZeroMQ over TCP.
    Tcp,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "ipc" => Ok(Self::Ipc),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!(
                "invalid transport kind '{other}', expected 'local', 'ipc' or 'tcp'"
            )),
        }
    }
}

/// Transport section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// TCP host the coordinator binds and workers connect to.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// IPC socket name (used when kind = "ipc").
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,

    /// How long the coordinator waits for every worker to announce itself.
    #[serde(default = "default_hello_timeout")]
    pub hello_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5580
}

fn default_ipc_name() -> String {
    "coordinator".into()
}

fn default_hello_timeout() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            ipc_name: default_ipc_name(),
            hello_timeout_secs: default_hello_timeout(),
        }
    }
}

/// Worker pool section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: u32,
}

fn default_worker_count() -> u32 {
    4
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

//! Where the ZeroMQ sockets live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskfarm_core::config::{TransportConfig, TransportKind};
use tracing::debug;

/// Directory holding IPC socket files.
const IPC_DIR: &str = "/tmp/taskfarm";

/// Socket address shared by the coordinator and its workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket `/tmp/taskfarm/<name>.sock`, for single-host runs.
    Ipc(String),
    /// TCP, for runs spanning hosts.
    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_owned())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// The socket transport named by `config`, or `None` for in-process runs.
    pub fn from_config(config: &TransportConfig) -> Option<Self> {
        match config.kind {
            TransportKind::Local => None,
            TransportKind::Ipc => Some(Self::ipc(&config.ipc_name)),
            TransportKind::Tcp => Some(Self::tcp(config.host.clone(), config.port)),
        }
    }

    /// ZeroMQ endpoint string, e.g. `tcp://127.0.0.1:5580`.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc://{IPC_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Socket file backing an IPC transport.
    pub fn ipc_path(&self) -> Option<PathBuf> {
        match self {
            Self::Ipc(name) => Some(Path::new(IPC_DIR).join(format!("{name}.sock"))),
            Self::Tcp { .. } => None,
        }
    }

    /// Create the IPC socket directory; binding fails without it.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        match self.ipc_path().as_deref().and_then(Path::parent) {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
    }

    /// Delete a socket file left behind by a coordinator that did not exit
    /// cleanly. Binding over it would fail with `EADDRINUSE`.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        let Some(path) = self.ipc_path() else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale IPC socket");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("coordinator");
        assert_eq!(t.endpoint(), "ipc:///tmp/taskfarm/coordinator.sock");
    }

    #[test]
    fn only_ipc_has_a_socket_file() {
        assert_eq!(
            Transport::ipc("a").ipc_path(),
            Some(PathBuf::from("/tmp/taskfarm/a.sock"))
        );
        assert_eq!(Transport::tcp("h", 1).ipc_path(), None);
        Transport::tcp("h", 1).remove_stale_socket().unwrap();
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5580);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5580");
        assert_eq!(t.to_string(), t.endpoint());
    }

    #[test]
    fn resolved_from_config() {
        let mut cfg = TransportConfig::default();
        assert_eq!(Transport::from_config(&cfg), None);

        cfg.kind = TransportKind::Tcp;
        cfg.port = 6001;
        assert_eq!(
            Transport::from_config(&cfg),
            Some(Transport::tcp("127.0.0.1", 6001))
        );

        cfg.kind = TransportKind::Ipc;
        cfg.ipc_name = "farm".into();
        assert_eq!(Transport::from_config(&cfg), Some(Transport::ipc("farm")));
    }
}

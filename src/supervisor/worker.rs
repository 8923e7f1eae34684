//! Worker Processes
//!
//! The supervisor manages workers through the [`WorkerProcess`] /
//! [`WorkerLauncher`] seam so tests can drive the pool with mock processes.
//! The production launcher re-executes the current binary with the internal
//! `worker` role; each worker is an independent OS process with its own
//! memory space.

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

/// Lifecycle state of one supervised worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawn requested, process not yet confirmed up
    Starting,
    /// Process is up and serving
    Running,
    /// Process has terminated (terminal; triggers replacement)
    Exited,
}

/// How a worker process exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Whether the process exited with status zero
    pub clean: bool,

    /// Exit code, if the process exited normally
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// A clean exit (status zero)
    pub fn clean() -> Self {
        Self {
            clean: true,
            code: Some(0),
        }
    }

    /// A crash or non-zero exit
    pub fn crashed(code: Option<i32>) -> Self {
        Self { clean: false, code }
    }

    /// Build from a process exit status
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            clean: status.success(),
            code: status.code(),
        }
    }
}

/// One live worker process under supervision
#[async_trait]
pub trait WorkerProcess: Send + Sync {
    /// Worker identifier
    fn id(&self) -> &str;

    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Politely ask the worker to drain and exit
    async fn terminate(&self) -> Result<()>;

    /// Forcefully kill the worker
    async fn kill(&self) -> Result<()>;

    /// Wait for the worker to exit
    async fn wait(&self) -> ExitOutcome;
}

/// Spawns worker processes for pool slots
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launch a worker for `slot`
    async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>>;
}

/// Bookkeeping for one pool slot's current worker
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    /// Pool slot this worker fills
    pub slot: usize,

    /// Worker identifier
    pub id: String,

    /// OS process id, if known
    pub pid: Option<u32>,

    /// Current lifecycle state
    pub state: WorkerState,

    /// When this worker was spawned
    pub spawned_at: Instant,
}

#[cfg(unix)]
pub use unix::CommandLauncher;

#[cfg(unix)]
mod unix {
    use super::{ExitOutcome, WorkerLauncher, WorkerProcess};
    use anyhow::{anyhow, Context, Result};
    use async_trait::async_trait;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::path::PathBuf;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Launches workers by re-executing the current binary with the
    /// internal `worker` role.
    pub struct CommandLauncher {
        program: PathBuf,
        args: Vec<String>,
    }

    impl CommandLauncher {
        /// Launcher for the current executable, passing `args` to each
        /// worker after the `worker` subcommand.
        pub fn current_exe(args: Vec<String>) -> Result<Self> {
            let program =
                std::env::current_exe().context("Failed to resolve current executable")?;
            Ok(Self { program, args })
        }
    }

    #[async_trait]
    impl WorkerLauncher for CommandLauncher {
        async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>> {
            let mut command = Command::new(&self.program);
            command
                .arg("worker")
                .args(&self.args)
                .env("GATEWARDEN_WORKER_SLOT", slot.to_string())
                .kill_on_drop(true);

            let child = command
                .spawn()
                .with_context(|| format!("Failed to spawn worker process for slot {}", slot))?;

            let pid = child
                .id()
                .ok_or_else(|| anyhow!("Worker exited before its pid could be read"))?;
            let id = format!("worker-{}", uuid::Uuid::new_v4());

            info!("Spawned worker {} for slot {} (pid {})", id, slot, pid);

            Ok(Box::new(CommandWorker {
                id,
                pid,
                child: tokio::sync::Mutex::new(child),
            }))
        }
    }

    /// A worker backed by a spawned OS process
    pub struct CommandWorker {
        id: String,
        pid: u32,
        child: tokio::sync::Mutex<Child>,
    }

    #[async_trait]
    impl WorkerProcess for CommandWorker {
        fn id(&self) -> &str {
            &self.id
        }

        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }

        async fn terminate(&self) -> Result<()> {
            signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM)
                .with_context(|| format!("Failed to send SIGTERM to worker {}", self.id))
        }

        async fn kill(&self) -> Result<()> {
            signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL)
                .with_context(|| format!("Failed to send SIGKILL to worker {}", self.id))
        }

        async fn wait(&self) -> ExitOutcome {
            let mut child = self.child.lock().await;
            match child.wait().await {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    warn!("Failed to wait on worker {}: {}", self.id, e);
                    ExitOutcome::crashed(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_from_status() {
        let clean = ExitOutcome::clean();
        assert!(clean.clean);
        assert_eq!(clean.code, Some(0));

        let crashed = ExitOutcome::crashed(Some(1));
        assert!(!crashed.clean);
        assert_eq!(crashed.code, Some(1));
    }

    #[test]
    fn test_worker_state_transitions_are_distinct() {
        assert_ne!(WorkerState::Starting, WorkerState::Running);
        assert_ne!(WorkerState::Running, WorkerState::Exited);
    }
}

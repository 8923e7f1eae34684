//! Supervisor Error Types

use std::time::Duration;

/// Errors surfaced by the worker pool supervisor
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A worker process could not be spawned
    #[error("Failed to spawn worker for slot {slot}: {source}")]
    Spawn {
        /// Pool slot that failed to fill
        slot: usize,
        /// Underlying launch error
        #[source]
        source: anyhow::Error,
    },

    /// A slot failed repeatedly in quick succession and was abandoned
    #[error("Worker slot {slot} abandoned after {failures} rapid failures within {window_secs}s")]
    CrashLoop {
        /// Abandoned pool slot
        slot: usize,
        /// Rapid failures observed
        failures: u32,
        /// Detection window in seconds
        window_secs: u64,
    },

    /// Graceful shutdown did not drain all workers in time
    #[error("Shutdown timed out after {timeout:?} with {still_running} workers still running")]
    ShutdownTimeout {
        /// Configured shutdown timeout
        timeout: Duration,
        /// Workers that had to be force-killed
        still_running: usize,
    },
}

//! Worker Pool Supervision
//!
//! The primary process keeps a fixed-size pool of worker processes alive:
//! it spawns one worker per pool slot, watches for exits, and replaces
//! crashed workers with bounded backoff. Slots that crash-loop are
//! abandoned and surfaced rather than restarted forever. Shutdown is an
//! explicit two-phase protocol: signal every worker, then wait (with a
//! timeout) for the pool to drain.

pub mod config;
pub mod error;
pub mod pool;
pub mod worker;

pub use config::PoolConfig;
pub use error::SupervisorError;
pub use pool::{PoolStats, WorkerPool};
#[cfg(unix)]
pub use worker::CommandLauncher;
pub use worker::{ExitOutcome, WorkerLauncher, WorkerProcess, WorkerRecord, WorkerState};

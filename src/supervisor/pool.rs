//! Worker Pool
//!
//! Keeps a fixed-size pool of worker processes alive. Every worker exit is
//! reported over a channel to a single supervise loop, so registry mutation
//! is never concurrent. Exits outside shutdown trigger exactly one
//! replacement after a backoff; slots that fail rapidly and repeatedly are
//! abandoned and surfaced instead of restarted forever. Shutdown is
//! two-phase: broadcast a terminate request, wait for every record to reach
//! `Exited` under a timeout, then force-kill stragglers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::metrics;

use super::config::PoolConfig;
use super::error::SupervisorError;
use super::worker::{ExitOutcome, WorkerLauncher, WorkerProcess, WorkerRecord, WorkerState};

/// How often the shutdown path re-checks for remaining live workers
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Notification from a worker monitor task to the supervise loop
#[derive(Debug)]
enum WorkerEvent {
    Exited { slot: usize, outcome: ExitOutcome },
}

struct SlotEntry {
    record: WorkerRecord,
    process: Option<Arc<dyn WorkerProcess>>,
    recent_failures: VecDeque<Instant>,
    abandoned: bool,
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Configured pool size
    pub pool_size: usize,

    /// Workers currently alive
    pub live_workers: usize,

    /// Total worker spawns, including the initial fill
    pub total_spawns: u64,

    /// Replacement spawns after worker exits
    pub restarts: u64,

    /// Slots abandoned by the crash-loop detector
    pub abandoned_slots: usize,
}

struct PoolInner {
    config: PoolConfig,
    launcher: Arc<dyn WorkerLauncher>,
    slots: RwLock<HashMap<usize, SlotEntry>>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    shutting_down: AtomicBool,
    total_spawns: AtomicU64,
    restarts: AtomicU64,
    supervise_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Worker pool supervisor.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawn the initial pool and start supervising.
    pub async fn start(
        config: PoolConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, SupervisorError> {
        info!("Starting worker pool with {} workers", config.pool_size);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                launcher,
                slots: RwLock::new(HashMap::new()),
                events_tx,
                shutting_down: AtomicBool::new(false),
                total_spawns: AtomicU64::new(0),
                restarts: AtomicU64::new(0),
                supervise_task: Mutex::new(None),
            }),
        };

        for slot in 0..pool.inner.config.pool_size {
            pool.spawn_worker(slot)
                .await
                .map_err(|source| SupervisorError::Spawn { slot, source })?;
        }

        let supervise = tokio::spawn(pool.clone().supervise(events_rx));
        *pool.inner.supervise_task.lock().await = Some(supervise);

        Ok(pool)
    }

    /// Launch a worker into `slot` and start its exit monitor.
    async fn spawn_worker(&self, slot: usize) -> anyhow::Result<()> {
        {
            let mut slots = self.inner.slots.write().await;
            match slots.get_mut(&slot) {
                Some(entry) => entry.record.state = WorkerState::Starting,
                None => {
                    slots.insert(
                        slot,
                        SlotEntry {
                            record: WorkerRecord {
                                slot,
                                id: String::new(),
                                pid: None,
                                state: WorkerState::Starting,
                                spawned_at: Instant::now(),
                            },
                            process: None,
                            recent_failures: VecDeque::new(),
                            abandoned: false,
                        },
                    );
                }
            }
        }

        let process: Arc<dyn WorkerProcess> = Arc::from(self.inner.launcher.launch(slot).await?);

        {
            let mut slots = self.inner.slots.write().await;
            if let Some(entry) = slots.get_mut(&slot) {
                entry.record = WorkerRecord {
                    slot,
                    id: process.id().to_string(),
                    pid: process.pid(),
                    state: WorkerState::Running,
                    spawned_at: Instant::now(),
                };
                entry.process = Some(process.clone());
            }
        }

        self.inner.total_spawns.fetch_add(1, Ordering::SeqCst);
        metrics::LIVE_WORKERS.set(self.live_workers().await as i64);

        let events_tx = self.inner.events_tx.clone();
        tokio::spawn(async move {
            let outcome = process.wait().await;
            let _ = events_tx.send(WorkerEvent::Exited { slot, outcome });
        });

        Ok(())
    }

    /// Single-consumer event loop; the only place the registry reacts to
    /// worker exits.
    async fn supervise(self, mut events_rx: mpsc::UnboundedReceiver<WorkerEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                WorkerEvent::Exited { slot, outcome } => self.handle_exit(slot, outcome).await,
            }
        }
    }

    async fn handle_exit(&self, slot: usize, outcome: ExitOutcome) {
        let uptime = {
            let mut slots = self.inner.slots.write().await;
            let Some(entry) = slots.get_mut(&slot) else {
                return;
            };
            entry.record.state = WorkerState::Exited;
            entry.process = None;
            entry.record.spawned_at.elapsed()
        };

        metrics::LIVE_WORKERS.set(self.live_workers().await as i64);

        if self.inner.shutting_down.load(Ordering::SeqCst) {
            debug!("Worker slot {} exited during shutdown", slot);
            return;
        }

        if outcome.clean {
            info!("Worker slot {} exited cleanly after {:?}", slot, uptime);
        } else {
            warn!(
                "Worker slot {} crashed (code {:?}) after {:?}",
                slot, outcome.code, uptime
            );
        }

        let rapid_failures = {
            let now = Instant::now();
            let mut slots = self.inner.slots.write().await;
            let Some(entry) = slots.get_mut(&slot) else {
                return;
            };

            // A worker that stayed up past the stability threshold wipes
            // the slot's failure history.
            if uptime >= self.inner.config.stability_threshold() {
                entry.recent_failures.clear();
            }
            entry.recent_failures.push_back(now);

            let window = self.inner.config.rapid_failure_window();
            while entry
                .recent_failures
                .front()
                .is_some_and(|t| now.duration_since(*t) > window)
            {
                entry.recent_failures.pop_front();
            }

            let rapid = entry.recent_failures.len() as u32;
            if rapid >= self.inner.config.max_rapid_failures {
                entry.abandoned = true;
            }
            rapid
        };

        if rapid_failures >= self.inner.config.max_rapid_failures {
            metrics::CRASH_LOOP_ESCALATIONS_TOTAL.inc();
            error!(
                "{}",
                SupervisorError::CrashLoop {
                    slot,
                    failures: rapid_failures,
                    window_secs: self.inner.config.rapid_failure_window_secs,
                }
            );
            return;
        }

        let delay = self.inner.config.restart_delay(rapid_failures);
        debug!("Restarting worker slot {} in {:?}", slot, delay);

        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if pool.inner.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            pool.inner.restarts.fetch_add(1, Ordering::SeqCst);
            metrics::WORKER_RESTARTS_TOTAL.inc();

            if let Err(e) = pool.spawn_worker(slot).await {
                error!("Failed to restart worker for slot {}: {:#}", slot, e);
                // Feed the failure back through the loop so it gets backoff
                // and, eventually, crash-loop escalation.
                let _ = pool.inner.events_tx.send(WorkerEvent::Exited {
                    slot,
                    outcome: ExitOutcome::crashed(None),
                });
            }
        });
    }

    /// Two-phase graceful shutdown.
    ///
    /// Broadcasts a terminate request to every live worker, waits for all
    /// records to reach `Exited` within the configured timeout, then
    /// force-kills whatever is left.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        info!("Shutting down worker pool");
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let processes: Vec<Arc<dyn WorkerProcess>> = {
            let slots = self.inner.slots.read().await;
            slots.values().filter_map(|e| e.process.clone()).collect()
        };

        for process in &processes {
            if let Err(e) = process.terminate().await {
                warn!("Failed to signal worker {}: {:#}", process.id(), e);
            }
        }

        let timeout = self.inner.config.shutdown_timeout();
        if tokio::time::timeout(timeout, self.wait_all_exited())
            .await
            .is_ok()
        {
            self.stop_supervise().await;
            info!("All workers exited");
            return Ok(());
        }

        let stragglers: Vec<Arc<dyn WorkerProcess>> = {
            let slots = self.inner.slots.read().await;
            slots.values().filter_map(|e| e.process.clone()).collect()
        };
        let still_running = stragglers.len();
        warn!("Force-killing {} workers after timeout", still_running);

        for process in &stragglers {
            if let Err(e) = process.kill().await {
                warn!("Failed to kill worker {}: {:#}", process.id(), e);
            }
        }
        let _ = tokio::time::timeout(Duration::from_secs(1), self.wait_all_exited()).await;
        self.stop_supervise().await;

        Err(SupervisorError::ShutdownTimeout {
            timeout,
            still_running,
        })
    }

    async fn wait_all_exited(&self) {
        loop {
            if self.live_workers().await == 0 {
                return;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    async fn stop_supervise(&self) {
        if let Some(task) = self.inner.supervise_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Number of workers currently alive
    pub async fn live_workers(&self) -> usize {
        let slots = self.inner.slots.read().await;
        slots.values().filter(|e| e.process.is_some()).count()
    }

    /// Snapshot of all worker records
    pub async fn records(&self) -> Vec<WorkerRecord> {
        let slots = self.inner.slots.read().await;
        slots.values().map(|e| e.record.clone()).collect()
    }

    /// Pool statistics
    pub async fn stats(&self) -> PoolStats {
        let slots = self.inner.slots.read().await;
        PoolStats {
            pool_size: self.inner.config.pool_size,
            live_workers: slots.values().filter(|e| e.process.is_some()).count(),
            total_spawns: self.inner.total_spawns.load(Ordering::SeqCst),
            restarts: self.inner.restarts.load(Ordering::SeqCst),
            abandoned_slots: slots.values().filter(|e| e.abandoned).count(),
        }
    }
}

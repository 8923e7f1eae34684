//! Window Store
//!
//! In-memory per-client window bookkeeping. The store is an explicit object
//! handed to each limiter by construction; limiters given the same store
//! share one per-client budget, limiters given separate stores do not.
//!
//! A background sweep evicts windows that have been idle longer than a fixed
//! staleness threshold, independent of any limiter's own window length. The
//! sweep is a scoped task with an explicit stop handle so it never outlives
//! the store's owner.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{Duration, Instant};

use super::config::LimitPolicy;
use super::limiter::LimitDecision;

/// Windows idle longer than this are evicted by the sweep, regardless of the
/// limiter's configured window length.
pub const STALE_AFTER: Duration = Duration::from_millis(60_000);

/// How often the background sweep fires.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One client's current throttling state.
#[derive(Debug, Clone, Copy)]
pub struct ClientWindow {
    /// Requests seen in the current window
    pub count: u32,

    /// When the current window opened
    pub window_start: Instant,
}

/// In-memory window store, shared by every limiter constructed over it.
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct WindowStore {
    windows: Arc<RwLock<HashMap<String, ClientWindow>>>,
}

impl WindowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate one request from `key` under `policy`.
    ///
    /// Fixed-window algorithm: a first request from a key opens a window
    /// with `count = 1`; a request after the window expired resets it; a
    /// request at the budget is rejected without incrementing the count;
    /// anything else increments and passes.
    pub async fn check(&self, key: &str, policy: &LimitPolicy) -> LimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        if let Some(window) = windows.get_mut(key) {
            let elapsed = now.duration_since(window.window_start);

            if elapsed > policy.window() {
                window.count = 1;
                window.window_start = now;
                return LimitDecision::Allowed {
                    remaining: policy.max_requests.saturating_sub(1),
                };
            }

            if window.count >= policy.max_requests {
                // Rejections do not consume budget.
                let remaining_ms = policy.window_ms.saturating_sub(elapsed.as_millis() as u64);
                return LimitDecision::Rejected {
                    retry_after_secs: remaining_ms.div_ceil(1000),
                };
            }

            window.count += 1;
            return LimitDecision::Allowed {
                remaining: policy.max_requests - window.count,
            };
        }

        windows.insert(
            key.to_string(),
            ClientWindow {
                count: 1,
                window_start: now,
            },
        );
        LimitDecision::Allowed {
            remaining: policy.max_requests.saturating_sub(1),
        }
    }

    /// Evict windows idle longer than [`STALE_AFTER`]. Returns the number
    /// of evicted entries.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.window_start) <= STALE_AFTER);
        before - windows.len()
    }

    /// Number of tracked client windows
    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Whether the store tracks no windows
    pub async fn is_empty(&self) -> bool {
        self.windows.read().await.is_empty()
    }

    /// Drop all windows
    pub async fn clear(&self) {
        self.windows.write().await.clear();
    }

    /// Snapshot of one client's window, if tracked
    pub async fn window(&self, key: &str) -> Option<ClientWindow> {
        self.windows.read().await.get(key).copied()
    }

    /// Start the background sweep task.
    ///
    /// The task fires every [`SWEEP_INTERVAL`] until the returned handle is
    /// stopped or dropped.
    pub fn spawn_sweep_task(&self) -> SweepHandle {
        let store = self.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick completes immediately; skip it so the sweep
            // cadence starts one full interval after spawn.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = store.sweep().await;
                        if evicted > 0 {
                            tracing::debug!("Sweep evicted {} stale client windows", evicted);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        SweepHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running sweep task.
///
/// Dropping the handle also stops the task, since the shutdown channel
/// closes; `stop` additionally waits for the task to finish.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep task and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

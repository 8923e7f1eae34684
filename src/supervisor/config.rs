//! Supervisor Configuration
//!
//! Pool sizing, restart backoff, crash-loop detection, and shutdown timing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default restart backoff base delay
pub const DEFAULT_RESTART_BASE_DELAY_MS: u64 = 100;

/// Default restart backoff cap
pub const DEFAULT_RESTART_MAX_DELAY_MS: u64 = 5_000;

/// Default rapid-failure count that triggers crash-loop escalation
pub const DEFAULT_MAX_RAPID_FAILURES: u32 = 5;

/// Default window within which failures count as rapid
pub const DEFAULT_RAPID_FAILURE_WINDOW_SECS: u64 = 30;

/// Default uptime after which a worker is considered stable
pub const DEFAULT_STABILITY_THRESHOLD_SECS: u64 = 10;

/// Default graceful shutdown timeout
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker processes to keep alive
    pub pool_size: usize,

    /// Base delay before restarting a failed worker (milliseconds)
    pub restart_base_delay_ms: u64,

    /// Upper bound on the restart delay (milliseconds)
    pub restart_max_delay_ms: u64,

    /// Add jitter to restart delays
    pub use_jitter: bool,

    /// Rapid failures within the detection window before the slot is
    /// abandoned instead of restarted
    pub max_rapid_failures: u32,

    /// Detection window for rapid failures (seconds)
    pub rapid_failure_window_secs: u64,

    /// Uptime after which a worker's failure history is forgotten (seconds)
    pub stability_threshold_secs: u64,

    /// How long graceful shutdown waits for workers to exit (seconds)
    pub shutdown_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            restart_base_delay_ms: DEFAULT_RESTART_BASE_DELAY_MS,
            restart_max_delay_ms: DEFAULT_RESTART_MAX_DELAY_MS,
            use_jitter: true,
            max_rapid_failures: DEFAULT_MAX_RAPID_FAILURES,
            rapid_failure_window_secs: DEFAULT_RAPID_FAILURE_WINDOW_SECS,
            stability_threshold_secs: DEFAULT_STABILITY_THRESHOLD_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(size_str) = std::env::var("GATEWARDEN_POOL_SIZE") {
            if let Ok(size) = size_str.parse::<usize>() {
                if size > 0 && size <= 256 {
                    config.pool_size = size;
                }
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_RESTART_BASE_DELAY_MS") {
            if let Ok(delay) = val.parse() {
                config.restart_base_delay_ms = delay;
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_MAX_RAPID_FAILURES") {
            if let Ok(failures) = val.parse::<u32>() {
                if failures > 0 {
                    config.max_rapid_failures = failures;
                }
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_SHUTDOWN_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 {
                    config.shutdown_timeout_secs = secs;
                }
            }
        }

        config
    }

    /// Delay before the next restart attempt for a slot.
    ///
    /// Exponential backoff from the base delay, capped, with optional
    /// jitter of up to 20% in either direction.
    pub fn restart_delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        let delay_ms = self
            .restart_base_delay_ms
            .saturating_mul(2_u64.pow(exponent))
            .min(self.restart_max_delay_ms);

        let delay_ms = if self.use_jitter && delay_ms > 0 {
            let jitter = (delay_ms as f64 * 0.2) as u64;
            let mut rng = rand::rng();
            let random_jitter = rng.random_range(0..=jitter);
            if rng.random_bool(0.5) {
                delay_ms.saturating_add(random_jitter)
            } else {
                delay_ms.saturating_sub(random_jitter)
            }
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }

    /// Detection window for rapid failures
    pub fn rapid_failure_window(&self) -> Duration {
        Duration::from_secs(self.rapid_failure_window_secs)
    }

    /// Stability threshold as a duration
    pub fn stability_threshold(&self) -> Duration {
        Duration::from_secs(self.stability_threshold_secs)
    }

    /// Graceful shutdown timeout as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_size_matches_core_count() {
        let config = PoolConfig::default();
        assert_eq!(config.pool_size, num_cpus::get());
        assert!(config.pool_size > 0);
    }

    #[test]
    fn test_restart_delay_grows_and_caps() {
        let config = PoolConfig {
            use_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.restart_delay(1), Duration::from_millis(100));
        assert_eq!(config.restart_delay(2), Duration::from_millis(200));
        assert_eq!(config.restart_delay(3), Duration::from_millis(400));
        // Capped at the maximum delay.
        assert_eq!(config.restart_delay(30), Duration::from_millis(5_000));
    }

    #[test]
    fn test_restart_delay_jitter_stays_in_band() {
        let config = PoolConfig::default();
        for _ in 0..100 {
            let delay = config.restart_delay(1).as_millis() as u64;
            assert!((80..=120).contains(&delay), "delay {} out of band", delay);
        }
    }

    #[test]
    fn test_from_env_pool_size() {
        std::env::set_var("GATEWARDEN_POOL_SIZE", "3");
        let config = PoolConfig::from_env();
        assert_eq!(config.pool_size, 3);

        // Zero is rejected and the default kept.
        std::env::set_var("GATEWARDEN_POOL_SIZE", "0");
        let config = PoolConfig::from_env();
        assert_eq!(config.pool_size, num_cpus::get());

        std::env::remove_var("GATEWARDEN_POOL_SIZE");
    }
}

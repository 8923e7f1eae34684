//! Rate Limit Configuration
//!
//! Per-call-site limit policies. Each governed endpoint class configures its
//! own request budget and window length.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default general-API limit (requests per window)
pub const DEFAULT_API_MAX_REQUESTS: u32 = 100;
/// Default authentication limit (requests per window)
pub const DEFAULT_AUTH_MAX_REQUESTS: u32 = 5;
/// Default reporting limit (requests per window)
pub const DEFAULT_REPORT_MAX_REQUESTS: u32 = 100;
/// Default window length in milliseconds
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// A fixed counting-window policy: at most `max_requests` per `window_ms`.
///
/// The window resets the instant a request arrives more than `window_ms`
/// after the window started. This is a fixed window, not a sliding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Maximum requests allowed within one window
    pub max_requests: u32,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl LimitPolicy {
    /// Create a new policy
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// Window length as a `Duration`
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Limit policies for the three deployed call-sites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// General API traffic
    pub general: LimitPolicy,

    /// Authentication endpoints
    pub auth: LimitPolicy,

    /// Reporting endpoints
    pub reporting: LimitPolicy,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            general: LimitPolicy::new(DEFAULT_API_MAX_REQUESTS, DEFAULT_WINDOW_MS),
            auth: LimitPolicy::new(DEFAULT_AUTH_MAX_REQUESTS, DEFAULT_WINDOW_MS),
            reporting: LimitPolicy::new(DEFAULT_REPORT_MAX_REQUESTS, DEFAULT_WINDOW_MS),
        }
    }
}

impl LimiterSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(val) = std::env::var("GATEWARDEN_API_MAX_REQUESTS") {
            if let Ok(limit) = val.parse() {
                settings.general.max_requests = limit;
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_AUTH_MAX_REQUESTS") {
            if let Ok(limit) = val.parse() {
                settings.auth.max_requests = limit;
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_REPORT_MAX_REQUESTS") {
            if let Ok(limit) = val.parse() {
                settings.reporting.max_requests = limit;
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_WINDOW_MS") {
            if let Ok(window_ms) = val.parse::<u64>() {
                if window_ms >= 1000 {
                    settings.general.window_ms = window_ms;
                    settings.auth.window_ms = window_ms;
                    settings.reporting.window_ms = window_ms;
                }
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = LimiterSettings::default();
        assert_eq!(settings.general.max_requests, 100);
        assert_eq!(settings.auth.max_requests, 5);
        assert_eq!(settings.reporting.max_requests, 100);
        assert_eq!(settings.general.window_ms, 60_000);
    }

    #[test]
    fn test_policy_window() {
        let policy = LimitPolicy::new(10, 5_000);
        assert_eq!(policy.window(), Duration::from_secs(5));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = LimiterSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: LimiterSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings.auth, parsed.auth);
    }
}

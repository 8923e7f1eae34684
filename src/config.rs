//! Service Configuration
//!
//! Aggregates the pieces each role needs: where workers listen, where the
//! metrics endpoint lives, pool behavior, and the limiter policies.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::rate_limit::LimiterSettings;
use crate::supervisor::PoolConfig;

/// Default worker listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address every worker binds (shared via SO_REUSEPORT)
    pub listen: SocketAddr,

    /// Port for the primary's metrics endpoint
    pub metrics_port: u16,

    /// Worker pool behavior
    pub pool: PoolConfig,

    /// Per-call-site limiter policies
    pub limiters: LimiterSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid"),
            metrics_port: DEFAULT_METRICS_PORT,
            pool: PoolConfig::default(),
            limiters: LimiterSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            pool: PoolConfig::from_env(),
            limiters: LimiterSettings::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("GATEWARDEN_LISTEN") {
            if let Ok(addr) = val.parse() {
                config.listen = addr;
            }
        }

        if let Ok(val) = std::env::var("GATEWARDEN_METRICS_PORT") {
            if let Ok(port) = val.parse() {
                config.metrics_port = port;
            }
        }

        config
    }
}

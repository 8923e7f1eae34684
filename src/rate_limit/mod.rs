//! Per-Client Rate Limiting
//!
//! Fixed counting-window rate limiting, bucketed by client identity
//! (typically the source address). Each governed endpoint class builds its
//! own limiter from a `(max_requests, window_ms)` policy; the per-client
//! bookkeeping lives in an explicit [`WindowStore`] so budget sharing
//! between limiters is a constructor decision, not a module-level accident.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Governed Router                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐          │
//! │  │ general    │  │ auth       │  │ reporting  │          │
//! │  │ 100 / 60s  │  │ 5 / 60s    │  │ 100 / 60s  │          │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘          │
//! │        ▼               ▼               ▼                 │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  WindowStore(s)  +  background sweep (scoped task) │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod limiter;
pub mod middleware;
pub mod store;

pub use config::{LimitPolicy, LimiterSettings};
pub use limiter::{LimitDecision, RateLimiter};
pub use middleware::enforce_limit;
pub use store::{ClientWindow, SweepHandle, WindowStore};

//! Gatewarden Library
//!
//! Process-resilience and request-governance layer for the inventory
//! service: a primary process that supervises a pool of identical worker
//! processes, and a per-client fixed-window rate limiter wired as axum
//! middleware ahead of the business routes.

pub mod config;
pub mod metrics;
pub mod metrics_server;
pub mod rate_limit;
pub mod service;
pub mod supervisor;

//! Governed Service
//!
//! The worker-side HTTP surface. Business handlers live elsewhere; the
//! routes here are the thin entry points the governance layer wraps. What
//! matters is the middleware ordering: the metrics recorder sits outside
//! the limiters, so a rejected request is still observed as a completed
//! request with status 429.
//!
//! Each worker binds the shared listen address with `SO_REUSEPORT`, leaving
//! connection fan-out across the pool to the operating system. Workers also
//! serve the metrics routes themselves: request counters live in worker
//! memory, which the primary's own scrape endpoint cannot see.

use anyhow::{Context, Result};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpSocket;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics;
use crate::rate_limit::{enforce_limit, LimiterSettings, RateLimiter, SweepHandle};

/// A built router plus the sweep tasks backing its limiters.
pub struct GovernedApp {
    /// The governed router
    pub router: Router,
    sweepers: Vec<SweepHandle>,
}

impl GovernedApp {
    /// Stop the limiter sweep tasks
    pub async fn shutdown(self) {
        for sweeper in self.sweepers {
            sweeper.stop().await;
        }
    }
}

/// Build the governed router with one isolated store per limiter and the
/// sweep tasks running.
pub fn build_app(settings: &LimiterSettings) -> GovernedApp {
    let general = RateLimiter::with_policy(settings.general);
    let auth = RateLimiter::with_policy(settings.auth);
    let reporting = RateLimiter::with_policy(settings.reporting);

    let sweepers = vec![
        general.store().spawn_sweep_task(),
        auth.store().spawn_sweep_task(),
        reporting.store().spawn_sweep_task(),
    ];

    GovernedApp {
        router: router_with_limiters(general, auth, reporting),
        sweepers,
    }
}

/// Assemble the router from explicit limiters (tests hand in their own).
pub fn router_with_limiters(
    general: RateLimiter,
    auth: RateLimiter,
    reporting: RateLimiter,
) -> Router {
    let api = Router::new()
        .route("/api/equipment", get(service_status))
        .route("/api/requests", get(service_status))
        .route_layer(middleware::from_fn_with_state(general, enforce_limit));

    let auth_routes = Router::new()
        .route("/auth/login", post(service_status))
        .route_layer(middleware::from_fn_with_state(auth, enforce_limit));

    let reports = Router::new()
        .route("/reports/summary", get(service_status))
        .route_layer(middleware::from_fn_with_state(reporting, enforce_limit));

    Router::new()
        .merge(api)
        .merge(auth_routes)
        .merge(reports)
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        // Each worker is its own address space, so its request metrics are
        // only visible through its own scrape endpoint. Mounted after the
        // layers: scrapes are neither limited nor recorded.
        .merge(crate::metrics_server::metrics_routes())
}

/// Record duration, count, and in-flight gauge for every request.
///
/// Runs outside the limiters: a 429 rejection is recorded with its final
/// status like any other completed request.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let route = request.uri().path().to_owned();
    let start = Instant::now();

    metrics::ACTIVE_CONNECTIONS.inc();
    let response = next.run(request).await;
    metrics::ACTIVE_CONNECTIONS.dec();

    let status = response.status().as_u16().to_string();
    metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&route, &status])
        .observe(start.elapsed().as_secs_f64());
    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&route, &status])
        .inc();
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        metrics::RATE_LIMITED_REQUESTS_TOTAL.inc();
    }

    response
}

/// Stand-in for the business handlers consuming the governance layer
async fn service_status() -> Json<serde_json::Value> {
    metrics::DB_QUERIES_TOTAL.inc();
    Json(json!({ "status": "ok" }))
}

/// Run one worker process: bind the shared address, serve until told to
/// terminate, then drain and stop the sweep tasks.
pub async fn run_worker(listen: SocketAddr, settings: LimiterSettings) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;
    let app = build_app(&settings);

    let socket = match listen {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .context("Failed to create listener socket")?;

    socket
        .set_reuseaddr(true)
        .context("Failed to set SO_REUSEADDR")?;
    #[cfg(unix)]
    socket
        .set_reuseport(true)
        .context("Failed to set SO_REUSEPORT")?;
    socket
        .bind(listen)
        .with_context(|| format!("Failed to bind worker listener on {}", listen))?;
    let listener = socket.listen(1024).context("Failed to listen")?;

    let slot = std::env::var("GATEWARDEN_WORKER_SLOT").unwrap_or_else(|_| "?".to_string());
    info!("Worker (slot {}) listening on {}", slot, listen);

    axum::serve(
        listener,
        app.router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Worker server error")?;

    info!("Worker (slot {}) drained, exiting", slot);
    app.shutdown().await;
    Ok(())
}

/// Resolves when the process is asked to stop (SIGTERM from the supervisor,
/// or Ctrl-C when run by hand).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

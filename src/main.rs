// Gatewarden - Main Entry Point
//
// Two roles share this binary:
// - the primary: supervises the worker pool, serves /metrics, and turns a
//   termination signal into a two-phase pool shutdown
// - a worker: serves the governed routes until the primary signals it

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use gatewarden::config::ServiceConfig;
use gatewarden::service;

/// Gatewarden: worker-pool supervision and request governance
#[derive(Parser, Debug)]
#[command(name = "gatewarden")]
#[command(version = "0.1.0")]
#[command(about = "Supervised worker pool with per-client rate limiting", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the primary: supervise the worker pool and serve metrics
    Serve {
        /// Address the workers listen on
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Metrics endpoint port
        #[arg(long)]
        metrics_port: Option<u16>,
    },
    /// Internal: run one worker process (spawned by the primary)
    #[command(hide = true)]
    Worker {
        /// Address to listen on
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    let config = ServiceConfig::from_env();

    match args.command {
        Some(Commands::Worker { listen }) => {
            let listen = listen.unwrap_or(config.listen);
            service::run_worker(listen, config.limiters).await
        }
        Some(Commands::Serve {
            listen,
            metrics_port,
        }) => {
            let mut config = config;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if let Some(port) = metrics_port {
                config.metrics_port = port;
            }
            serve(config).await
        }
        None => {
            info!("No command specified. Use \"gatewarden --help\" for usage.");
            Ok(())
        }
    }
}

/// Run the primary process until a termination signal arrives.
#[cfg(unix)]
async fn serve(config: ServiceConfig) -> Result<()> {
    use gatewarden::supervisor::{CommandLauncher, WorkerPool};
    use std::sync::Arc;

    info!(
        "Gatewarden primary starting: {} workers on {}",
        config.pool.pool_size, config.listen
    );

    let launcher = Arc::new(CommandLauncher::current_exe(vec![
        "--listen".to_string(),
        config.listen.to_string(),
    ])?);
    let pool = WorkerPool::start(config.pool.clone(), launcher).await?;

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = gatewarden::metrics_server::start_metrics_server(metrics_port).await {
            error!("Metrics server failed: {:#}", e);
        }
    });

    service::shutdown_signal().await;
    info!("Termination signal received, draining worker pool");

    if let Err(e) = pool.shutdown().await {
        warn!("Pool shutdown incomplete: {}", e);
    }

    info!("Gatewarden primary exiting");
    Ok(())
}

#[cfg(not(unix))]
async fn serve(_config: ServiceConfig) -> Result<()> {
    anyhow::bail!("Worker supervision requires a Unix host")
}

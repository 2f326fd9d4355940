// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use cr_syncer::{
    cluster::ClusterHandle,
    constants::{
        CLUSTER_CLOUD, CLUSTER_ROBOT, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH,
        METRICS_SERVER_PORT, REMOTE_API_PREFIX, TOKIO_WORKER_THREADS,
    },
    metrics,
    supervisor::Supervisor,
    transport,
};
use kube::{Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

/// Synchronizes custom resources between a cloud and a robot cluster.
#[derive(Parser, Debug)]
#[command(name = "cr-syncer", version, about)]
struct Args {
    /// Remote (cloud) cluster endpoint
    #[arg(long)]
    remote_server: Url,

    /// Robot identity matched against the robot-name label by kinds that
    /// opt in to filtering
    #[arg(long, default_value = "")]
    robot_name: String,

    /// Log every HTTP request and response on both clusters
    #[arg(long)]
    verbose: bool,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, default_value_t = METRICS_SERVER_PORT)]
    metrics_port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("cr-syncer")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO
/// level (or DEBUG with `--verbose`, which also surfaces per-request HTTP
/// traces from the client stacks). Respects `RUST_LOG_FORMAT` environment
/// variable for output format (json or text).
fn initialize_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting custom resource syncer");
}

/// Initialize clients for the robot and cloud clusters.
///
/// The robot cluster is reached with in-cluster service-account credentials
/// (kubeconfig as a development fallback); the cloud cluster goes through
/// the gateway transport with an ambient Google Cloud credential.
async fn initialize_clusters(args: &Args) -> Result<(ClusterHandle, ClusterHandle)> {
    debug!("Initializing robot cluster client");
    let local = Client::try_from(Config::infer().await?)?;
    info!("Robot cluster client initialized");

    debug!(remote_server = %args.remote_server, "Initializing cloud cluster client");
    let remote = transport::remote_client(&args.remote_server).await?;
    info!(
        remote_server = %args.remote_server,
        api_prefix = REMOTE_API_PREFIX,
        "Cloud cluster client initialized"
    );

    Ok((
        ClusterHandle::new(remote, CLUSTER_CLOUD),
        ClusterHandle::new(local, CLUSTER_ROBOT),
    ))
}

/// Start the Prometheus metrics HTTP server
///
/// Serves metrics on the configured port (default: 0.0.0.0:8080/metrics)
fn start_metrics_server(port: u16) -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = METRICS_SERVER_BIND_ADDRESS,
        port,
        path = METRICS_SERVER_PATH,
        "Starting Prometheus metrics HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(metrics_text) => metrics_text,
                Err(e) => {
                    error!("Failed to gather metrics: {}", e);
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

        let bind_addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_addr}: {e}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_addr}{METRICS_SERVER_PATH}");

        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

async fn async_main(args: Args) -> Result<()> {
    initialize_logging(args.verbose);

    let (cloud, robot) = initialize_clusters(&args).await?;

    // Start the metrics HTTP server
    let _metrics_handle = start_metrics_server(args.metrics_port);

    let supervisor = Supervisor::new(cloud, robot, args.robot_name.clone());
    let shutdown = CancellationToken::new();
    let mut supervisor_task = tokio::spawn(supervisor.run(shutdown.child_token()));

    // Run the supervisor with signal handling; it should never exit on its
    // own, so an early return is treated as fatal.
    let shutdown_result: Result<()> = tokio::select! {
        // Monitor for SIGINT (Ctrl+C)
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        // Monitor for SIGTERM (Kubernetes sends this when deleting pods)
        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                // On non-Unix platforms, just wait forever
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = &mut supervisor_task => {
            error!("CRITICAL: CRD supervisor exited unexpectedly: {:?}", result);
            result??;
            anyhow::bail!("CRD supervisor exited unexpectedly without error")
        }
    };

    shutdown_result?;

    info!("Stopping all reconcilers...");
    shutdown.cancel();
    supervisor_task.await??;

    info!("Graceful shutdown completed successfully");
    Ok(())
}

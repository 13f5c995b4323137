//! autocd API server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autocd_api::shutdown::shutdown_signal;
use autocd_api::{AppState, routes, telemetry};
use autocd_config::load_config;
use autocd_executor::ScriptExecutor;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// How long to wait for stopped runs to be reaped on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "autocd-server")]
#[command(about = "Run scripts in response to signed GitHub webhooks", version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "AUTOCD_CONFIG", default_value = "config.kdl")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let _log_guard = telemetry::init(&config.logs)?;

    if config.webhook.secret.is_empty() {
        warn!("webhook secret is empty, signatures are computed with an empty key");
    }

    let executor = Arc::new(ScriptExecutor::new(config.executor_config()));
    info!(
        scripts_dir = %executor.config().scripts_dir.display(),
        push_script = %config.scripts.push,
        timeout = ?executor.config().timeout,
        max_concurrent = executor.config().max_concurrent,
        "script executor ready"
    );
    if config.admin.token.is_none() {
        info!("no admin token configured, operator routes disabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook.port));
    let webhook_path = config.webhook.path.clone();

    let state = AppState::new(config, executor.clone());
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, path = %webhook_path, "listening for webhooks");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let stopped = executor.shutdown();
    if stopped > 0 {
        info!(stopped, "stopping live runs");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while !executor.registry().is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = executor.registry().len(), "runs still registered at exit");
        }
    }

    info!("server stopped");
    Ok(())
}

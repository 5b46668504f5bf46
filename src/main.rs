//! Pool Manager process entrypoint (spec.md §4.11): loads the resolved
//! config, spawns one Worker OS process per enabled account, and serves
//! the thin axum control plane (SPEC_FULL.md §A.5) alongside it.

use clap::Parser;
use multifx::application::pool_manager::PoolManager;
use multifx::config;
use multifx::infrastructure::control_api::{self, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "multifx pool manager", long_about = None)]
struct Args {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Path to the sibling `worker` binary. Defaults to the directory this
    /// binary was launched from.
    #[arg(long)]
    worker_binary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    info!("multifx pool manager {} starting", env!("CARGO_PKG_VERSION"));

    let snapshot = config::load_snapshot(&args.config)?;
    info!(accounts = snapshot.accounts.len(), "config loaded");

    let worker_binary = args.worker_binary.unwrap_or_else(sibling_worker_path);
    let mut pool = PoolManager::new(worker_binary);

    for account in &snapshot.accounts {
        if let Err(e) = pool.start_worker(&account.name, account, false).await {
            error!(account_id = %account.name, error = %e, "failed to start worker");
        }
    }

    let state = AppState::new(pool);
    let app = control_api::router(state.clone());

    spawn_status_poll(state.clone());

    info!(bind = %args.bind, "control plane listening");
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn sibling_worker_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("multifx"));
    path.set_file_name(if cfg!(windows) { "worker.exe" } else { "worker" });
    path
}

/// Periodically nudges every running worker for a status report so the
/// `/events` stream stays warm even without client-driven polling.
fn spawn_status_poll(state: std::sync::Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let mut pool = state.pool.lock().await;
            pool.broadcast_status();
        }
    });
}

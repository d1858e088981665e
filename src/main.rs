use std::net::SocketAddr;
use std::sync::Arc;

use todo_server::api::{self, AppState};
use todo_server::remote::{RemoteTaskSource, DEFAULT_BASE_URL};
use todo_server::repository::TaskRepository;
use todo_server::store::TaskStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store_path = env_or("TODO_STORE_PATH", "tasks.redb");
    let bind = env_or("TODO_BIND", "0.0.0.0:3000");
    let remote_url = env_or("TODO_REMOTE_URL", DEFAULT_BASE_URL);

    // ── Wire the layers, leaf to root ──────────────────────────
    let store = TaskStore::open(&store_path).expect("failed to open task store");
    let remote = RemoteTaskSource::new(remote_url);
    let repo = TaskRepository::new(store, remote);

    // ── First-run seeding ──────────────────────────────────────
    match repo.seed_if_empty().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "first run: seeded tasks from remote"),
        Err(e) => tracing::error!(error = %e, "seeding failed"),
    }

    let task_count = repo.fetch_all().map(|t| t.len()).unwrap_or(0);
    tracing::info!(tasks = task_count, path = %store_path, "store ready");

    let state = Arc::new(AppState { repo });

    // ── Serve ──────────────────────────────────────────────────
    let app = api::router(Arc::clone(&state));
    let addr: SocketAddr = bind.parse().expect("invalid TODO_BIND address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Best-effort flush of anything still pending before the process goes
    // away; a failure here is logged, never fatal.
    if let Err(e) = state.repo.flush() {
        tracing::warn!(error = %e, "final flush failed");
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

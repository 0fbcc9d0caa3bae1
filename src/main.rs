//! Coalesce web service
//!
//! Serves the read-only coalescing API over HTTP. The service expects to sit
//! behind a TLS-terminating proxy that sets `X-Forwarded-Proto`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | REDIS_URL | - | Store URL (required) |
//! | PORT | 5000 | HTTP port |
//! | BIND_ADDR | 0.0.0.0 | HTTP listen address |
//! | COALESCE_PREFIX | coalesce.v1. | Store key prefix |
//! | REDIS_TIMEOUT_MS | - | Per-command store timeout |
//! | LOG_FORMAT | text | text or json |
//! | COALESCE_CONFIG | - | Optional TOML config file |
//! | RUST_LOG | info | Log filter |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use coalesce::observability::init_tracing;
use coalesce::web::{create_router, AppState};
use coalesce::{LogFormat, RespStore, ServiceConfig, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            // Config decides the log format, so fall back to text here.
            init_tracing(LogFormat::Text);
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = RespStore::new(config.redis_url.clone());
    if let Some(timeout) = config.redis_timeout {
        store = store.with_timeout(timeout);
    }

    match store.ping().await {
        Ok(()) => info!(redis = ?config.redis_url, "Store reachable"),
        // Each request reconnects on demand, so an unreachable store is not fatal.
        Err(e) => warn!(redis = ?config.redis_url, error = %e, "Store not reachable at startup"),
    }

    let state = AppState::new(Arc::new(store), config.prefix.clone());
    let app = create_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, prefix = %config.prefix, "Coalesce web service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

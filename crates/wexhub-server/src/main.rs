//! WexHub Daemon - multi-tenant IFC processing backend
//!
//! Boots the full stack: configuration, tracing, the SQLite store, the
//! filesystem blob store, the processing worker pool, and the hyper HTTP
//! front. Exit code 0 on clean shutdown, non-zero on startup failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wexhub_core::config::Config;
use wexhub_server::{build_state, http, AppState};

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("wexhubd failed to start: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<()> {
    let config_path = std::env::var("WEXHUB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("wexhub.yaml"));
    let config = Config::load_or_default(&config_path);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    config.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let mut state = build_state(config).await?;

    let shutdown = CancellationToken::new();
    let worker_handles = state.spawn_workers(shutdown.clone());
    let state = Arc::new(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "wexhubd listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service = service_fn(move |request| {
                        let state: Arc<AppState> = Arc::clone(&state);
                        async move {
                            Ok::<_, std::convert::Infallible>(
                                http::handle(&state, request, Some(remote)).await,
                            )
                        }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        // Client disconnects land here; nothing to do
                        tracing::debug!(error = %e, "Connection closed with error");
                    }
                });
            }
        }
    }

    // Drain: workers finish their in-flight job, idle waiters cancel
    shutdown.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }
    info!("wexhubd stopped");
    Ok(())
}

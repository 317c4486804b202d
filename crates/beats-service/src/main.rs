//! beats-service binary.
//!
//! Loads configuration from the environment, builds the router, and serves
//! until SIGINT/SIGTERM. The anchor advancer is driven externally through
//! `GET /api/cron/anchor`; nothing here schedules it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use beats_service::config::Config;
use beats_service::ledger::{LedgerClient, RpcLedger};
use beats_service::{build_router, AppState};

/// Beats - public time authentication over a ledger-anchored hash chain
#[derive(Parser, Debug)]
#[command(name = "beats-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, secret) = Config::from_env().context("loading configuration")?;
    let signer = secret.receipt_signer();

    let ledger = Arc::new(
        RpcLedger::new(config.rpc_url.clone(), secret.writer_key())
            .context("building ledger client")?,
    );

    // Operators cross-check these against the published /key endpoint.
    tracing::info!(
        writer = %ledger.writer_address(),
        timestamp_key = %signer.timestamp.public_key_base58(),
        work_proof_key = %signer.work_proof.public_key_base58(),
        rpc_url = %config.rpc_url,
        cluster = ?config.cluster,
        "beats service starting"
    );

    let state = Arc::new(AppState::new(config, signer, ledger));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(bind = %args.bind, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    tracing::info!("shut down cleanly");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM so in-flight verifications can finish.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(%error, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!();
        },
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

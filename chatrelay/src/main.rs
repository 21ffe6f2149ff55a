// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use chatrelay::backend;
use chatrelay::config;
use chatrelay::relay;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay", about = "Streaming chat relay gateway")]
struct Cli {
    /// Path to a chatrelay.yaml config file. Defaults apply when omitted.
    #[arg(long, env = "CHATRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "CHATRELAY_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = relay::BIND_ADDR.1, env = "CHATRELAY_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "chatrelay starting");

    let loaded = match &cli.config {
        Some(path) => config::load_config(&config::FileSource { path: path.clone() }),
        None => config::default_config(),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        environment = %config.environment,
        backend = %config.backend.url,
        timeout_ms = config.backend.timeout.as_millis() as u64,
        idle_timeout_ms = config.backend.idle_timeout.as_millis() as u64,
        "config loaded"
    );

    let upstream: Arc<dyn relay::UpstreamClient> =
        match backend::build_backend_client(&config.backend) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::error!("failed to build backend client: {e}");
                std::process::exit(1);
            }
        };

    let app = relay::build_router(upstream, relay::RelaySettings::from_config(&config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "chatrelay listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("chatrelay stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

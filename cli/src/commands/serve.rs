// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server for provisioning requests

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use efs_provisioner_core::presentation::api;

use super::{build_provisioner, load_config};

pub async fn handle_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    if config.metrics.enabled {
        init_prometheus_exporter(config.metrics.port)?;
    }

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let provisioner = build_provisioner(config).await?;
    let app = api::app(provisioner);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Provisioner listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Provisioner shutting down");

    Ok(())
}

fn init_prometheus_exporter(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to start Prometheus exporter")?;

    metrics::describe_counter!(
        "efs_provisioner_provision_total",
        "Provisioning attempts by result"
    );
    metrics::describe_histogram!(
        "efs_provisioner_provision_duration_seconds",
        "Wall time of one provisioning attempt"
    );

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

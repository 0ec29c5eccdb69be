// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Mount helper reaper
//!
//! NFS mount helpers that lose their server block in uninterruptible sleep
//! and pin the kubelet. This command finds and kills them.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use efs_provisioner_core::application::mount_reaper::MountReaper;
use efs_provisioner_core::domain::config::ProvisionerConfig;
use efs_provisioner_core::infrastructure::event_bus::EventBus;
use efs_provisioner_core::infrastructure::process_table::SysinfoProcessTable;

use super::serve::shutdown_signal;

pub async fn handle_command(once: bool, config_path: Option<PathBuf>) -> Result<()> {
    // Reaping needs no AWS settings; only the reaper section is checked
    let config = ProvisionerConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    let reaper = MountReaper::new(Box::new(SysinfoProcessTable::new()), &config.reaper)
        .context("Invalid reaper configuration")?
        .with_event_bus(Arc::new(EventBus::with_default_capacity()));

    if once {
        let mut reaper = reaper;
        let report = reaper.sweep().context("Sweep failed")?;
        println!(
            "Examined {} {} processes",
            report.examined, config.reaper.executable
        );
        for pid in &report.killed {
            println!("  {} killed {}", "✓".green(), pid);
        }
        if report.failed > 0 {
            println!("  {} {} could not be killed", "✗".red(), report.failed);
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.cancel();
    });

    reaper.run(cancel).await;
    info!("Reaper exited");

    Ok(())
}

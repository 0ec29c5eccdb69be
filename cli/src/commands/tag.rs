// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Tag backfill across every filesystem in the region

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use efs_provisioner_core::application::tagger::tag_untagged;
use efs_provisioner_core::domain::config::ProvisionerConfig;
use efs_provisioner_core::infrastructure::efs::create_filesystem_service;

pub async fn handle_command(key: String, value: String, config_path: Option<PathBuf>) -> Result<()> {
    // Only the region and backend matter for tagging
    let config = ProvisionerConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    let service = create_filesystem_service(config.backend, &config.region).await;
    let report = tag_untagged(service.as_ref(), &key, &value)
        .await
        .context("Tagging failed")?;

    for id in &report.tagged {
        println!("  {} {}", "tagged".green(), id);
    }
    println!(
        "{}",
        format!(
            "✓ {} examined, {} tagged, {} already tagged",
            report.examined,
            report.tagged.len(),
            report.skipped
        )
        .bold()
    );

    Ok(())
}

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use efs_provisioner_core::application::provisioner::Provisioner;

use super::{build_provisioner, load_config};

pub async fn handle_command(name: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let provisioner = build_provisioner(config).await?;

    provisioner.delete(&name).await?;

    println!(
        "{} {} released; the filesystem was retained",
        "✓".green(),
        name
    );

    Ok(())
}

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! # EFS Provisioner CLI
//!
//! The `efs-provisioner` binary turns storage requests into EFS filesystems
//! with a mount target in every configured subnet.
//!
//! ## Commands
//!
//! - `efs-provisioner serve` - HTTP server for provisioning requests
//! - `efs-provisioner provision|delete` - One-shot reconciliation
//! - `efs-provisioner tag` - Backfill a tag onto every filesystem
//! - `efs-provisioner reap` - Kill NFS mount helpers stuck in the kernel
//! - `efs-provisioner config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::Parser;

use efs_provisioner::commands::{self, Cli, Commands};
use efs_provisioner::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Serve => commands::serve::handle_command(cli.config).await,
        Commands::Provision(args) => commands::provision::handle_command(args, cli.config).await,
        Commands::Delete { name } => commands::delete::handle_command(name, cli.config).await,
        Commands::Tag { key, value } => commands::tag::handle_command(key, value, cli.config).await,
        Commands::Reap { once } => commands::reap::handle_command(once, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

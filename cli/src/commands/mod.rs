// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the EFS provisioner CLI

pub mod config;
pub mod delete;
pub mod provision;
pub mod reap;
pub mod serve;
pub mod tag;

pub use self::config::ConfigCommand;
pub use self::provision::ProvisionArgs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use efs_provisioner_core::application::provisioner::StandardProvisioner;
use efs_provisioner_core::domain::config::{ProvisionerConfig, CONFIG_PATH_ENV};
use efs_provisioner_core::infrastructure::efs::create_filesystem_service;
use efs_provisioner_core::infrastructure::event_bus::EventBus;

use crate::logging::LogFormat;

/// EFS Provisioner - Dynamically provisioned EFS volumes
#[derive(Parser)]
#[command(name = "efs-provisioner")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "EFS_PROVISIONER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve provisioning requests over HTTP
    #[command(name = "serve")]
    Serve,

    /// Provision one volume and print its descriptor
    #[command(name = "provision")]
    Provision(ProvisionArgs),

    /// Release a volume (filesystems are always retained)
    #[command(name = "delete")]
    Delete {
        /// Volume name (the filesystem id)
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Tag every filesystem that does not carry KEY=VALUE yet
    #[command(name = "tag")]
    Tag {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Kill mount helpers stuck in uninterruptible sleep
    #[command(name = "reap")]
    Reap {
        /// Sweep once and exit instead of looping
        #[arg(long)]
        once: bool,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Load, override and validate the configuration.
pub fn load_config(config_path: Option<PathBuf>) -> Result<ProvisionerConfig> {
    let config =
        ProvisionerConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Wire the provisioner to the configured filesystem service.
pub async fn build_provisioner(config: ProvisionerConfig) -> Result<Arc<StandardProvisioner>> {
    info!(
        "Provisioner {} in {} (format: {}, subnets: {})",
        config.provisioner_name,
        config.region,
        config.format,
        config.subnets.join(",")
    );

    let service = create_filesystem_service(config.backend, &config.region).await;
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let provisioner = StandardProvisioner::new(config, service, event_bus)
        .context("Failed to initialize provisioner")?;

    Ok(Arc::new(provisioner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_provision() {
        let cli = Cli::try_parse_from([
            "efs-provisioner",
            "--log-format",
            "json",
            "provision",
            "--namespace",
            "foo",
            "--pv-name",
            "bar",
            "--access-mode",
            "RWX",
            "--access-mode",
            "ReadOnlyMany",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Provision(args) = cli.command else {
            panic!("expected provision");
        };
        let request = args.request();
        assert_eq!(request.namespace, "foo");
        assert_eq!(request.pv_name, "bar");
        assert_eq!(request.access_modes.len(), 2);
    }

    #[test]
    fn test_parse_reap_once() {
        let cli = Cli::try_parse_from(["efs-provisioner", "reap", "--once"]).unwrap();
        assert!(matches!(cli.command, Commands::Reap { once: true }));
    }

    #[test]
    fn test_load_config_rejects_incomplete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "region: us-east-1\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(format!("{:#}", err).contains("security_group is required"));
    }
}

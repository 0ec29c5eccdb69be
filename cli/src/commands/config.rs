// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use efs_provisioner_core::domain::config::{ProvisionerConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./efs-provisioner.yaml")]
        output: PathBuf,

        /// Include every setting with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ProvisionerConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./efs-provisioner.yaml");
        println!("  4. ~/.efs-provisioner/config.yaml");
        println!("  5. /etc/efs-provisioner/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Provisioner:".bold());
    println!("  Name: {}", config.provisioner_name);
    println!("  Region: {}", config.region);
    println!("  Format: {}", config.format);
    println!("  Performance: {}", config.performance);
    println!("  Backend: {:?}", config.backend);
    println!();

    println!("{}", "Mount Targets:".bold());
    if config.security_group.is_empty() {
        println!("  Security group: {}", "(not set)".red());
    } else {
        println!("  Security group: {}", config.security_group);
    }
    if config.subnets.is_empty() {
        println!("  Subnets: {}", "(none)".red());
    }
    for subnet in &config.subnets {
        println!("    - {}", subnet);
    }
    println!(
        "  Mode: {}",
        if config.concurrent_mount_targets {
            "concurrent"
        } else {
            "sequential"
        }
    );
    println!();

    println!("{}", "Polling:".bold());
    println!("  Interval: {}s", config.poll.interval_seconds);
    println!("  Timeout: {}s", config.poll.timeout_seconds);
    println!();

    println!("{}", "Endpoints:".bold());
    println!(
        "  API: {}:{}",
        config.server.bind_address, config.server.port
    );
    if config.metrics.enabled {
        println!("  Metrics: :{}", config.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ProvisionerConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_parse() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = ProvisionerConfig::from_yaml_str(template).unwrap();
            assert!(config.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("efs-provisioner.yaml");

        generate(output.clone(), false).await.unwrap();

        let loaded = ProvisionerConfig::from_yaml_file(&output).unwrap();
        assert_eq!(loaded.subnets.len(), 2);
    }
}

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration
//
// Immutable settings handed to the provisioner at construction time:
// - AWS region and the network placement of mount targets
// - Naming template that derives creation tokens from requests
// - Poll cadence and wait budget for the convergence loops
// - HTTP, metrics and mount reaper settings for the binaries
//
// Loaded from YAML, then overridden from the environment so container
// deployments can be configured without a file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::application::naming::NameTemplate;
use crate::domain::filesystem::PerformanceMode;

/// Environment variable that points at a configuration file.
pub const CONFIG_PATH_ENV: &str = "EFS_PROVISIONER_CONFIG_PATH";

/// Top-level provisioner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Identity the provisioner registers under with the platform
    #[serde(default = "default_provisioner_name")]
    pub provisioner_name: String,

    /// AWS region; also used to build the NFS server address
    #[serde(default = "default_region")]
    pub region: String,

    /// Naming template, e.g. `{namespace}-{pvName}`
    #[serde(default = "default_format")]
    pub format: String,

    /// Performance mode for new filesystems
    #[serde(default)]
    pub performance: PerformanceMode,

    /// Security group attached to every mount target (required)
    #[serde(default)]
    pub security_group: String,

    /// Subnets that must each get a mount target (required, non-empty)
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Converge mount targets for all subnets at once instead of in order
    #[serde(default)]
    pub concurrent_mount_targets: bool,

    /// Which filesystem service implementation to use
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Environment overrides that could not be applied; reported by `validate()`
    #[serde(skip)]
    pub override_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Amazon EFS through the AWS SDK
    #[default]
    Aws,
    /// In-process fake, for local development
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between two describe calls while waiting for "available"
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,

    /// Total wait budget per resource before giving up
    #[serde(default = "default_poll_timeout")]
    pub timeout_seconds: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Executable name of the mount helper to watch
    #[serde(default = "default_reaper_executable")]
    pub executable: String,

    /// Seconds between two sweeps of the process table
    #[serde(default = "default_reaper_interval")]
    pub interval_seconds: u64,
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Rules the reaper settings must satisfy on their own.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.executable.trim().is_empty() {
            problems.push("reaper.executable cannot be empty".to_string());
        }
        if self.interval_seconds == 0 {
            problems.push("reaper.interval_seconds must be greater than zero".to_string());
        }
        problems
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_provisioner_name() -> String {
    "skpr.io/standard".to_string()
}

fn default_region() -> String {
    "ap-southeast-2".to_string()
}

fn default_format() -> String {
    "{namespace}-{pvName}".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_poll_timeout() -> u64 {
    600
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_reaper_executable() -> String {
    "mount.nfs".to_string()
}

fn default_reaper_interval() -> u64 {
    5
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
            timeout_seconds: default_poll_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            executable: default_reaper_executable(),
            interval_seconds: default_reaper_interval(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            provisioner_name: default_provisioner_name(),
            region: default_region(),
            format: default_format(),
            performance: PerformanceMode::default(),
            security_group: String::new(),
            subnets: Vec::new(),
            concurrent_mount_targets: false,
            backend: BackendKind::default(),
            poll: PollConfig::default(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
            reaper: ReaperConfig::default(),
            override_errors: Vec::new(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. EFS_PROVISIONER_CONFIG_PATH environment variable
    /// 2. ./efs-provisioner.yaml (working directory)
    /// 3. ~/.efs-provisioner/config.yaml (user home)
    /// 4. /etc/efs-provisioner/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./efs-provisioner.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".efs-provisioner").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/efs-provisioner/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `AWS_REGION`, `EFS_PROVISIONER_NAME`,
    /// `EFS_PROVISIONER_FORMAT`, `EFS_PROVISIONER_PERFORMANCE`,
    /// `EFS_PROVISIONER_SECURITYGROUP`, `EFS_PROVISIONER_SUBNETS`
    /// (comma separated).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup("AWS_REGION") {
            tracing::info!("Environment override: AWS_REGION={}", region);
            self.region = region;
        }

        if let Some(name) = lookup("EFS_PROVISIONER_NAME") {
            self.provisioner_name = name;
        }

        if let Some(format) = lookup("EFS_PROVISIONER_FORMAT") {
            tracing::info!("Environment override: EFS_PROVISIONER_FORMAT={}", format);
            self.format = format;
        }

        if let Some(performance) = lookup("EFS_PROVISIONER_PERFORMANCE") {
            match performance.parse::<PerformanceMode>() {
                Ok(mode) => self.performance = mode,
                Err(e) => {
                    tracing::warn!("Rejecting EFS_PROVISIONER_PERFORMANCE: {}", e);
                    self.override_errors
                        .push(format!("EFS_PROVISIONER_PERFORMANCE: {}", e));
                }
            }
        }

        if let Some(security_group) = lookup("EFS_PROVISIONER_SECURITYGROUP") {
            self.security_group = security_group;
        }

        if let Some(subnets) = lookup("EFS_PROVISIONER_SUBNETS") {
            self.subnets = subnets
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Validate configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.override_errors.clone();

        if self.region.trim().is_empty() {
            problems.push("region cannot be empty".to_string());
        }

        if let Err(e) = NameTemplate::parse(&self.format) {
            problems.push(format!("format '{}' is invalid: {}", self.format, e));
        }

        if self.security_group.trim().is_empty() {
            problems.push("security_group is required".to_string());
        }

        if self.subnets.is_empty() {
            problems.push("at least one subnet is required".to_string());
        }

        for (index, subnet) in self.subnets.iter().enumerate() {
            if subnet.trim().is_empty() {
                problems.push(format!("subnets[{}] cannot be empty", index));
            } else if self.subnets[..index].contains(subnet) {
                problems.push(format!("subnet {} is listed more than once", subnet));
            }
        }

        if self.poll.interval_seconds == 0 {
            problems.push("poll.interval_seconds must be greater than zero".to_string());
        }

        if self.poll.timeout_seconds < self.poll.interval_seconds {
            problems.push("poll.timeout_seconds must be at least poll.interval_seconds".to_string());
        }

        problems.extend(self.reaper.problems());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

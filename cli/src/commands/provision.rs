// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! One-shot provisioning
//!
//! Runs a single reconciliation in-process, printing progress events while
//! it waits, then writes the descriptor to stdout.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use efs_provisioner_core::application::provisioner::Provisioner;
use efs_provisioner_core::domain::events::ProvisioningEvent;
use efs_provisioner_core::domain::request::{AccessMode, ProvisioningRequest};
use efs_provisioner_core::domain::volume::VolumeDescriptor;
use efs_provisioner_core::infrastructure::event_bus::{EventBusError, EventReceiver};

use super::{build_provisioner, load_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    /// Kubernetes PersistentVolume manifest
    Pv,
}

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    /// Namespace of the claim
    #[arg(long)]
    pub namespace: String,

    /// Name of the persistent volume to provision
    #[arg(long)]
    pub pv_name: String,

    /// Name of the claim
    #[arg(long)]
    pub pvc_name: Option<String>,

    /// Requested access mode (repeatable; RWO, ROX, RWX, RWOP or long form)
    #[arg(long = "access-mode", default_value = "ReadWriteMany")]
    pub access_modes: Vec<AccessMode>,

    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,
}

impl ProvisionArgs {
    pub fn request(&self) -> ProvisioningRequest {
        let request = ProvisioningRequest::new(&self.namespace, &self.pv_name)
            .with_access_modes(self.access_modes.iter().copied());
        match &self.pvc_name {
            Some(claim) => request.with_claim_name(claim),
            None => request,
        }
    }
}

pub async fn handle_command(args: ProvisionArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let provisioner = build_provisioner(config).await?;
    let request = args.request();

    let token = provisioner.creation_token(&request)?;
    eprintln!("{} {}", "Provisioning".bold(), token);

    let events = provisioner.event_bus().subscribe();
    let progress = tokio::spawn(follow_progress(events, |line| {
        eprintln!("  {}", line.dimmed());
    }));

    // Ctrl+C aborts the wait; the filesystem is picked up again on the next run
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling provisioning");
            on_interrupt.cancel();
        }
    });

    let result = provisioner.provision_with_cancel(&request, cancel).await;
    progress.abort();

    let descriptor = result.context("Provisioning failed")?;
    eprintln!("{}", "✓ Volume provisioned".green());
    println!("{}", render(&descriptor, args.output)?);

    Ok(())
}

/// Emit a line per progress event until the bus closes. Events dropped
/// because the receiver fell behind are skipped.
async fn follow_progress(mut events: EventReceiver, mut emit: impl FnMut(String)) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe_event(&event) {
                    emit(line);
                }
            }
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn describe_event(event: &ProvisioningEvent) -> Option<String> {
    match event {
        ProvisioningEvent::FilesystemCreated { filesystem_id, .. } => {
            Some(format!("created filesystem {}", filesystem_id))
        }
        ProvisioningEvent::FilesystemAvailable { filesystem_id, .. } => {
            Some(format!("filesystem {} is available", filesystem_id))
        }
        ProvisioningEvent::MountTargetCreated { subnet_id, mount_target_id, .. } => {
            Some(format!("created mount target {} in {}", mount_target_id, subnet_id))
        }
        ProvisioningEvent::MountTargetAvailable { subnet_id, .. } => {
            Some(format!("mount target in {} is available", subnet_id))
        }
        _ => None,
    }
}

pub fn render(descriptor: &VolumeDescriptor, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(descriptor)?,
        OutputFormat::Yaml => serde_yaml::to_string(descriptor)?,
        OutputFormat::Pv => serde_yaml::to_string(&descriptor.to_persistent_volume())?,
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use efs_provisioner_core::domain::filesystem::FilesystemId;
    use efs_provisioner_core::domain::request::CreationToken;
    use efs_provisioner_core::domain::volume::ReclaimPolicy;
    use efs_provisioner_core::infrastructure::event_bus::EventBus;

    fn descriptor() -> VolumeDescriptor {
        VolumeDescriptor {
            name: "fs-1".to_string(),
            server: "fs-1.efs.ap-southeast-2.amazonaws.com".to_string(),
            path: "/".to_string(),
            mount_options: "nfsvers=4.1".to_string(),
            capacity: "8.0E".to_string(),
            reclaim_policy: ReclaimPolicy::Retain,
            access_modes: vec![AccessMode::ReadWriteMany],
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_render_formats() {
        let json = render(&descriptor(), OutputFormat::Json).unwrap();
        assert!(json.contains("\"server\": \"fs-1.efs.ap-southeast-2.amazonaws.com\""));

        let yaml = render(&descriptor(), OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("reclaimPolicy: Retain"));

        let pv = render(&descriptor(), OutputFormat::Pv).unwrap();
        assert!(pv.contains("kind: PersistentVolume"));
    }

    #[tokio::test]
    async fn test_progress_continues_after_lag() {
        let bus = EventBus::new(2);
        let events = bus.subscribe();
        for id in ["fs-1", "fs-2", "fs-3", "fs-4"] {
            bus.publish(ProvisioningEvent::FilesystemCreated {
                token: CreationToken::new("namespace-test"),
                filesystem_id: FilesystemId::new(id),
                created_at: Default::default(),
            });
        }
        drop(bus);

        let mut lines = Vec::new();
        follow_progress(events, |line| lines.push(line)).await;

        assert_eq!(
            lines,
            vec!["created filesystem fs-3", "created filesystem fs-4"]
        );
    }
}

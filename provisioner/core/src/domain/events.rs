// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

// Provisioning domain events
//
// Published by the provisioner and the mount reaper so that the CLI, the
// HTTP surface and tests can observe progress without scraping logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::filesystem::FilesystemId;
use crate::domain::request::CreationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisioningEvent {
    FilesystemCreated {
        token: CreationToken,
        filesystem_id: FilesystemId,
        created_at: DateTime<Utc>,
    },
    FilesystemAvailable {
        token: CreationToken,
        filesystem_id: FilesystemId,
        available_at: DateTime<Utc>,
    },
    MountTargetCreated {
        filesystem_id: FilesystemId,
        subnet_id: String,
        mount_target_id: String,
        created_at: DateTime<Utc>,
    },
    MountTargetAvailable {
        filesystem_id: FilesystemId,
        subnet_id: String,
        available_at: DateTime<Utc>,
    },
    VolumeProvisioned {
        token: CreationToken,
        volume_name: String,
        server: String,
        provisioned_at: DateTime<Utc>,
    },
    ProvisioningFailed {
        token: Option<CreationToken>,
        error: String,
        failed_at: DateTime<Utc>,
    },
    VolumeDeleteSkipped {
        volume_name: String,
        skipped_at: DateTime<Utc>,
    },
    MountProcessReaped {
        pid: u32,
        executable: String,
        reaped_at: DateTime<Utc>,
    },
}

impl ProvisioningEvent {
    /// Creation token the event belongs to, when it has one.
    pub fn token(&self) -> Option<&CreationToken> {
        match self {
            Self::FilesystemCreated { token, .. }
            | Self::FilesystemAvailable { token, .. }
            | Self::VolumeProvisioned { token, .. } => Some(token),
            Self::ProvisioningFailed { token, .. } => token.as_ref(),
            Self::MountTargetCreated { .. }
            | Self::MountTargetAvailable { .. }
            | Self::VolumeDeleteSkipped { .. }
            | Self::MountProcessReaped { .. } => None,
        }
    }
}

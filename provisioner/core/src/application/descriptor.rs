// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Maps a converged filesystem onto the volume descriptor the platform mounts.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::filesystem::{FilesystemId, FilesystemResource, LifecycleState};
use crate::domain::request::ProvisioningRequest;
use crate::domain::volume::{
    ReclaimPolicy, VolumeDescriptor, CAPACITY_SENTINEL, EXPORT_PATH, MOUNT_OPTIONS,
    MOUNT_OPTIONS_ANNOTATION,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("filesystem {id} is {state}, not available")]
    NotAvailable {
        id: FilesystemId,
        state: LifecycleState,
    },

    #[error("request has no access modes")]
    NoAccessModes,
}

/// NFS server DNS name of a filesystem in `region`.
pub fn server_address(filesystem_id: &FilesystemId, region: &str) -> String {
    format!("{}.efs.{}.amazonaws.com", filesystem_id, region)
}

/// Build the descriptor for an available filesystem.
pub fn build_descriptor(
    filesystem: &FilesystemResource,
    request: &ProvisioningRequest,
    region: &str,
) -> Result<VolumeDescriptor, DescriptorError> {
    if !filesystem.lifecycle_state.is_available() {
        return Err(DescriptorError::NotAvailable {
            id: filesystem.id.clone(),
            state: filesystem.lifecycle_state.clone(),
        });
    }
    if request.access_modes.is_empty() {
        return Err(DescriptorError::NoAccessModes);
    }

    let annotations = BTreeMap::from([(
        MOUNT_OPTIONS_ANNOTATION.to_string(),
        MOUNT_OPTIONS.to_string(),
    )]);

    Ok(VolumeDescriptor {
        name: filesystem.id.to_string(),
        server: server_address(&filesystem.id, region),
        path: EXPORT_PATH.to_string(),
        mount_options: MOUNT_OPTIONS.to_string(),
        capacity: CAPACITY_SENTINEL.to_string(),
        reclaim_policy: ReclaimPolicy::Retain,
        access_modes: request.access_modes.clone(),
        annotations,
    })
}

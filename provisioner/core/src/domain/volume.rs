// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::domain::request::AccessMode;

// ============================================================================
// Constants
// ============================================================================

/// Mount options handed to the NFS client for every provisioned volume.
///
/// See http://docs.aws.amazon.com/efs/latest/ug/mounting-fs-mount-cmd-dns-name.html
pub const MOUNT_OPTIONS: &str = "nfsvers=4.1,rsize=1048576,wsize=1048576,hard,timeo=600,retrans=2";

/// Annotation under which the platform expects comma separated mount options.
pub const MOUNT_OPTIONS_ANNOTATION: &str = "volume.beta.kubernetes.io/mount-options";

/// EFS reports an effectively unbounded size when mounted; advertise the same.
pub const CAPACITY_SENTINEL: &str = "8.0E";

/// Every volume is exported from the filesystem root.
pub const EXPORT_PATH: &str = "/";

// ============================================================================
// Value Objects
// ============================================================================

/// What the platform should do with the backing storage once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReclaimPolicy {
    /// Keep the filesystem. The only policy this provisioner hands out.
    #[default]
    Retain,
}

/// Everything the platform needs to mount a provisioned filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeDescriptor {
    /// External volume name; the remote filesystem identifier
    pub name: String,

    /// NFS server DNS name
    pub server: String,

    /// Export path on the server
    pub path: String,

    /// Comma separated NFS mount options
    pub mount_options: String,

    /// Capacity quantity in the platform's notation
    pub capacity: String,

    pub reclaim_policy: ReclaimPolicy,

    /// Echo of the request's access modes
    pub access_modes: Vec<AccessMode>,

    /// Annotations to place on the platform's volume object
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl VolumeDescriptor {
    /// Render as a Kubernetes `PersistentVolume` object.
    pub fn to_persistent_volume(&self) -> serde_json::Value {
        let access_modes: Vec<&str> = self.access_modes.iter().map(AccessMode::as_str).collect();

        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": self.name,
                "annotations": self.annotations,
            },
            "spec": {
                "persistentVolumeReclaimPolicy": "Retain",
                "accessModes": access_modes,
                "capacity": {
                    "storage": self.capacity,
                },
                "nfs": {
                    "server": self.server,
                    "path": self.path,
                },
            },
        })
    }
}

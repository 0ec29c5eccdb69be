// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Remote-owned resources as the reconciler sees them.
//!
//! These are plain snapshots of what the filesystem service reported on the
//! last describe/create call. The reconciler never mutates them; it asks the
//! service again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::request::CreationToken;

/// Tag key used to give provisioned filesystems a human-readable name.
pub const NAME_TAG: &str = "Name";

// ============================================================================
// Value Objects
// ============================================================================

/// Identifier assigned by the remote service (`fs-0123abcd`), distinct from
/// the creation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilesystemId(pub String);

impl FilesystemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilesystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote lifecycle state.
///
/// Only [`LifecycleState::Available`] is terminal for provisioning purposes;
/// anything else (including states this crate does not know about) means
/// "keep polling".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Creating,
    Available,
    Updating,
    Deleting,
    Deleted,
    Error,
    Other(String),
}

impl LifecycleState {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
            Self::Other(state) => state.as_str(),
        }
    }
}

impl From<&str> for LifecycleState {
    fn from(state: &str) -> Self {
        match state {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "updating" => Self::Updating,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for LifecycleState {
    fn from(state: String) -> Self {
        Self::from(state.as_str())
    }
}

impl From<LifecycleState> for String {
    fn from(state: LifecycleState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance class requested at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PerformanceMode {
    #[default]
    #[serde(rename = "generalPurpose")]
    GeneralPurpose,
    #[serde(rename = "maxIO")]
    MaxIo,
}

impl PerformanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralPurpose => "generalPurpose",
            Self::MaxIo => "maxIO",
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown performance mode '{0}' (expected generalPurpose or maxIO)")]
pub struct UnknownPerformanceMode(pub String);

impl FromStr for PerformanceMode {
    type Err = UnknownPerformanceMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generalPurpose" => Ok(Self::GeneralPurpose),
            "maxIO" => Ok(Self::MaxIo),
            other => Err(UnknownPerformanceMode(other.to_string())),
        }
    }
}

/// Key/value label attached to a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Remote Resources
// ============================================================================

/// Snapshot of one filesystem as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemResource {
    pub id: FilesystemId,
    pub creation_token: CreationToken,
    pub lifecycle_state: LifecycleState,
    pub performance_mode: PerformanceMode,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl FilesystemResource {
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.iter().any(|tag| tag.key == key && tag.value == value)
    }

    /// Value of the `Name` tag, if any.
    pub fn name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == NAME_TAG)
            .map(|tag| tag.value.as_str())
    }
}

/// Snapshot of one mount target (network attachment point in a subnet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTarget {
    pub id: String,
    pub filesystem_id: FilesystemId,
    pub subnet_id: String,
    pub lifecycle_state: LifecycleState,
    /// Only populated when the service reports it; describe calls on EFS
    /// leave this empty.
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// One page of a filesystem listing.
#[derive(Debug, Clone, Default)]
pub struct FilesystemPage {
    pub filesystems: Vec<FilesystemResource>,
    pub next_marker: Option<String>,
}

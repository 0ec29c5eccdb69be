// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning requests and the idempotency key derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Access Modes
// ============================================================================

/// How the orchestration platform intends to mount the volume.
///
/// Serialized with the platform's own spelling (`ReadWriteMany`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
    ReadWriteOncePod,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWriteOnce => "ReadWriteOnce",
            Self::ReadOnlyMany => "ReadOnlyMany",
            Self::ReadWriteMany => "ReadWriteMany",
            Self::ReadWriteOncePod => "ReadWriteOncePod",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = RequestError;

    /// Accepts the long form and the kubectl abbreviations (`RWX`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadWriteOnce" | "RWO" => Ok(Self::ReadWriteOnce),
            "ReadOnlyMany" | "ROX" => Ok(Self::ReadOnlyMany),
            "ReadWriteMany" | "RWX" => Ok(Self::ReadWriteMany),
            "ReadWriteOncePod" | "RWOP" => Ok(Self::ReadWriteOncePod),
            other => Err(RequestError::UnknownAccessMode(other.to_string())),
        }
    }
}

// ============================================================================
// Provisioning Request
// ============================================================================

/// A caller's ask for one volume.
///
/// Immutable for the lifetime of a reconciliation attempt: the reconciler
/// only ever borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    /// Namespace of the claim that triggered provisioning
    pub namespace: String,

    /// Name the platform picked for the new persistent volume
    pub pv_name: String,

    /// Name of the claim, when the request source knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_name: Option<String>,

    /// Access modes requested by the claim, echoed into the descriptor
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
}

impl ProvisioningRequest {
    pub fn new(namespace: impl Into<String>, pv_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pv_name: pv_name.into(),
            pvc_name: None,
            access_modes: Vec::new(),
        }
    }

    pub fn with_claim_name(mut self, pvc_name: impl Into<String>) -> Self {
        self.pvc_name = Some(pvc_name.into());
        self
    }

    pub fn with_access_modes(mut self, modes: impl IntoIterator<Item = AccessMode>) -> Self {
        self.access_modes = modes.into_iter().collect();
        self
    }

    /// Resolve a template field name against this request.
    ///
    /// Returns `None` for unknown fields and for optional fields that the
    /// request does not carry.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "namespace" => Some(self.namespace.as_str()),
            "pvName" => Some(self.pv_name.as_str()),
            "pvcName" => self.pvc_name.as_deref(),
            _ => None,
        }
    }

    /// Field names a naming template may reference.
    pub const FIELDS: [&'static str; 3] = ["namespace", "pvName", "pvcName"];

    /// Reject requests the platform should never have sent.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.namespace.trim().is_empty() {
            return Err(RequestError::MissingField("namespace"));
        }
        if self.pv_name.trim().is_empty() {
            return Err(RequestError::MissingField("pvName"));
        }
        if matches!(self.pvc_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(RequestError::MissingField("pvcName"));
        }
        if self.access_modes.is_empty() {
            return Err(RequestError::NoAccessModes);
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request field '{0}' must not be empty")]
    MissingField(&'static str),

    #[error("request must specify at least one access mode")]
    NoAccessModes,

    #[error("unknown access mode: {0}")]
    UnknownAccessMode(String),
}

// ============================================================================
// Creation Token
// ============================================================================

/// Idempotency key for a remote filesystem.
///
/// Every retry of the same request recomputes the same token and therefore
/// lands on the same remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreationToken(String);

impl CreationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CreationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CreationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem Service Trait - Anti-Corruption Layer for the EFS API
//!
//! The reconciler only ever talks to the remote control plane through
//! [`FilesystemService`]. Every call is a single request/response and may
//! hand back a resource that is not yet usable; waiting is the caller's job.
//!
//! # Remote contract
//!
//! `create_filesystem` must be idempotent on the creation token: when a
//! filesystem with that token already exists (for example because a
//! concurrent caller won the race) the implementation returns the existing
//! resource instead of creating a second one. The reconciler relies on this
//! and does not defend against it across processes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::filesystem::{
    FilesystemId, FilesystemPage, FilesystemResource, MountTarget, PerformanceMode, Tag,
};
use crate::domain::request::CreationToken;

/// Remote filesystem control plane.
#[async_trait]
pub trait FilesystemService: Send + Sync {
    /// All filesystems created with `token` (zero or one in a healthy account).
    async fn describe_filesystems_by_token(
        &self,
        token: &CreationToken,
    ) -> Result<Vec<FilesystemResource>, RemoteError>;

    /// Create a filesystem keyed by `token`, tagged with `tags`.
    async fn create_filesystem(
        &self,
        token: &CreationToken,
        performance_mode: PerformanceMode,
        tags: &[Tag],
    ) -> Result<FilesystemResource, RemoteError>;

    /// Every mount target of one filesystem.
    async fn describe_mount_targets(
        &self,
        filesystem_id: &FilesystemId,
    ) -> Result<Vec<MountTarget>, RemoteError>;

    /// Attach `filesystem_id` to `subnet_id`, guarded by `security_groups`.
    async fn create_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        security_groups: &[String],
    ) -> Result<MountTarget, RemoteError>;

    /// One page of the account-wide filesystem listing.
    async fn list_filesystems(&self, marker: Option<&str>) -> Result<FilesystemPage, RemoteError>;

    /// Add or overwrite tags on a filesystem.
    async fn tag_resource(
        &self,
        filesystem_id: &FilesystemId,
        tags: &[Tag],
    ) -> Result<(), RemoteError>;
}

/// Failures reported by (or while talking to) the remote service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{operation} rejected by service{}: {message}", .code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("{operation}: resource not found: {resource}")]
    NotFound {
        operation: &'static str,
        resource: String,
    },

    #[error("{operation}: transport error: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("{operation}: invalid response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

impl RemoteError {
    /// Name of the remote operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Api { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::Transport { operation, .. }
            | Self::InvalidResponse { operation, .. } => *operation,
        }
    }

    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            code: None,
            message: message.into(),
        }
    }
}

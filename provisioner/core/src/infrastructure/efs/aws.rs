// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Amazon EFS Adapter
//!
//! Implements [`FilesystemService`] on top of `aws-sdk-efs`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Translate between SDK shapes and the domain model
//!
//! Credentials and endpoint resolution follow the standard AWS chain
//! (environment, profile, IMDS). Only the region is set explicitly.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_efs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_efs::types;
use aws_sdk_efs::Client;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::domain::filesystem::{
    FilesystemId, FilesystemPage, FilesystemResource, LifecycleState, MountTarget,
    PerformanceMode, Tag,
};
use crate::domain::remote::{FilesystemService, RemoteError};
use crate::domain::request::CreationToken;

pub struct EfsAdapter {
    client: Client,
}

impl EfsAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain for `region`.
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(Client::new(&config))
    }

    async fn describe_mount_target_page(
        &self,
        filesystem_id: &FilesystemId,
        marker: Option<String>,
    ) -> Result<(Vec<MountTarget>, Option<String>), RemoteError> {
        let output = self
            .client
            .describe_mount_targets()
            .file_system_id(filesystem_id.as_str())
            .set_marker(marker)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_file_system_not_found())
                    .unwrap_or(false);
                if not_found {
                    RemoteError::NotFound {
                        operation: "DescribeMountTargets",
                        resource: filesystem_id.to_string(),
                    }
                } else {
                    remote_error("DescribeMountTargets", err)
                }
            })?;

        let targets = output
            .mount_targets()
            .iter()
            .map(|target| MountTarget {
                id: target.mount_target_id().to_string(),
                filesystem_id: FilesystemId::new(target.file_system_id()),
                subnet_id: target.subnet_id().to_string(),
                lifecycle_state: lifecycle(target.life_cycle_state()),
                security_groups: Vec::new(),
                ip_address: target.ip_address().map(str::to_string),
            })
            .collect();

        Ok((targets, output.next_marker().map(str::to_string)))
    }
}

#[async_trait]
impl FilesystemService for EfsAdapter {
    async fn describe_filesystems_by_token(
        &self,
        token: &CreationToken,
    ) -> Result<Vec<FilesystemResource>, RemoteError> {
        debug!("DescribeFileSystems creation_token={}", token);

        let output = self
            .client
            .describe_file_systems()
            .creation_token(token.as_str())
            .send()
            .await
            .map_err(|err| remote_error("DescribeFileSystems", err))?;

        Ok(output.file_systems().iter().map(from_description).collect())
    }

    async fn create_filesystem(
        &self,
        token: &CreationToken,
        performance_mode: PerformanceMode,
        tags: &[Tag],
    ) -> Result<FilesystemResource, RemoteError> {
        let sdk_tags = tags
            .iter()
            .map(to_sdk_tag)
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .client
            .create_file_system()
            .creation_token(token.as_str())
            .performance_mode(match performance_mode {
                PerformanceMode::GeneralPurpose => types::PerformanceMode::GeneralPurpose,
                PerformanceMode::MaxIo => types::PerformanceMode::MaxIo,
            })
            .set_tags(Some(sdk_tags))
            .send()
            .await;

        match result {
            Ok(output) => Ok(FilesystemResource {
                id: FilesystemId::new(output.file_system_id()),
                creation_token: CreationToken::new(output.creation_token()),
                lifecycle_state: lifecycle(output.life_cycle_state()),
                performance_mode: performance(output.performance_mode()),
                tags: output.tags().iter().map(from_sdk_tag).collect(),
            }),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_file_system_already_exists())
                    .unwrap_or(false) =>
            {
                // Someone else created it first; the token makes it ours too.
                info!("Filesystem for token {} already exists, describing it", token);
                let mut existing = self.describe_filesystems_by_token(token).await?;
                match existing.len() {
                    1 => Ok(existing.remove(0)),
                    n => Err(RemoteError::InvalidResponse {
                        operation: "CreateFileSystem",
                        message: format!(
                            "token {} reported as existing but {} filesystems were described",
                            token, n
                        ),
                    }),
                }
            }
            Err(err) => Err(remote_error("CreateFileSystem", err)),
        }
    }

    async fn describe_mount_targets(
        &self,
        filesystem_id: &FilesystemId,
    ) -> Result<Vec<MountTarget>, RemoteError> {
        debug!("DescribeMountTargets file_system_id={}", filesystem_id);

        let mut targets = Vec::new();
        let mut marker = None;
        loop {
            let (page, next) = self.describe_mount_target_page(filesystem_id, marker).await?;
            targets.extend(page);
            match next {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => return Ok(targets),
            }
        }
    }

    async fn create_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        security_groups: &[String],
    ) -> Result<MountTarget, RemoteError> {
        let output = self
            .client
            .create_mount_target()
            .file_system_id(filesystem_id.as_str())
            .subnet_id(subnet_id)
            .set_security_groups(Some(security_groups.to_vec()))
            .send()
            .await
            .map_err(|err| remote_error("CreateMountTarget", err))?;

        Ok(MountTarget {
            id: output.mount_target_id().to_string(),
            filesystem_id: FilesystemId::new(output.file_system_id()),
            subnet_id: output.subnet_id().to_string(),
            lifecycle_state: lifecycle(output.life_cycle_state()),
            security_groups: security_groups.to_vec(),
            ip_address: output.ip_address().map(str::to_string),
        })
    }

    async fn list_filesystems(&self, marker: Option<&str>) -> Result<FilesystemPage, RemoteError> {
        let output = self
            .client
            .describe_file_systems()
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|err| remote_error("DescribeFileSystems", err))?;

        Ok(FilesystemPage {
            filesystems: output.file_systems().iter().map(from_description).collect(),
            next_marker: output.next_marker().map(str::to_string),
        })
    }

    async fn tag_resource(
        &self,
        filesystem_id: &FilesystemId,
        tags: &[Tag],
    ) -> Result<(), RemoteError> {
        let sdk_tags = tags
            .iter()
            .map(to_sdk_tag)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .tag_resource()
            .resource_id(filesystem_id.as_str())
            .set_tags(Some(sdk_tags))
            .send()
            .await
            .map_err(|err| remote_error("TagResource", err))?;

        Ok(())
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn from_description(description: &types::FileSystemDescription) -> FilesystemResource {
    FilesystemResource {
        id: FilesystemId::new(description.file_system_id()),
        creation_token: CreationToken::new(description.creation_token()),
        lifecycle_state: lifecycle(description.life_cycle_state()),
        performance_mode: performance(description.performance_mode()),
        tags: description.tags().iter().map(from_sdk_tag).collect(),
    }
}

fn lifecycle(state: &types::LifeCycleState) -> LifecycleState {
    LifecycleState::from(state.as_str())
}

fn performance(mode: &types::PerformanceMode) -> PerformanceMode {
    match mode {
        types::PerformanceMode::MaxIo => PerformanceMode::MaxIo,
        _ => PerformanceMode::GeneralPurpose,
    }
}

fn from_sdk_tag(tag: &types::Tag) -> Tag {
    Tag::new(tag.key(), tag.value())
}

fn to_sdk_tag(tag: &Tag) -> Result<types::Tag, RemoteError> {
    types::Tag::builder()
        .key(&tag.key)
        .value(&tag.value)
        .build()
        .map_err(|e| RemoteError::InvalidResponse {
            operation: "Tag",
            message: e.to_string(),
        })
}

/// Map an SDK failure onto the domain error, keeping the service's error code.
fn remote_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    if let SdkError::ServiceError(service) = &err {
        let inner = service.err();
        return RemoteError::Api {
            operation,
            code: inner.code().map(str::to_string),
            message: inner
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| inner.to_string()),
        };
    }

    let invalid_response = matches!(err, SdkError::ResponseError(_));
    let message = DisplayErrorContext(err).to_string();
    if invalid_response {
        RemoteError::InvalidResponse { operation, message }
    } else {
        RemoteError::Transport { operation, message }
    }
}

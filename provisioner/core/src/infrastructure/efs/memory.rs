// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! In-memory filesystem service.
//!
//! Behaves like EFS from the reconciler's point of view: creates are
//! idempotent on the creation token and new resources report "creating" for
//! a configurable number of describe calls before turning "available".
//! Failures can be injected per operation or per subnet, and every call is
//! counted so tests can assert on what was (not) sent.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::filesystem::{
    FilesystemId, FilesystemPage, FilesystemResource, LifecycleState, MountTarget,
    PerformanceMode, Tag,
};
use crate::domain::remote::{FilesystemService, RemoteError};
use crate::domain::request::CreationToken;

/// Remote operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeFilesystems,
    CreateFilesystem,
    DescribeMountTargets,
    CreateMountTarget,
    ListFilesystems,
    TagResource,
}

struct Stored<T> {
    resource: T,
    // Describe calls left before the resource turns available; None = never
    pending: Option<usize>,
}

impl<T> Stored<T> {
    /// Advance the scripted lifecycle by one describe.
    fn observe(&mut self, state: impl FnOnce(&mut T) -> &mut LifecycleState) {
        match self.pending {
            Some(0) => {
                *state(&mut self.resource) = LifecycleState::Available;
                self.pending = None;
            }
            Some(n) => self.pending = Some(n - 1),
            None => {}
        }
    }
}

#[derive(Default)]
struct State {
    filesystems: Vec<Stored<FilesystemResource>>,
    mount_targets: Vec<Stored<MountTarget>>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, RemoteError>,
    rejected_subnets: HashSet<String>,
    next_mount_target: usize,
}

impl State {
    /// Count the call and hand back an injected failure, if any.
    fn enter(&mut self, operation: Operation) -> Result<(), RemoteError> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.failures.remove(&operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct InMemoryFilesystemService {
    state: Mutex<State>,
    pending_polls: usize,
    page_size: usize,
}

impl Default for InMemoryFilesystemService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFilesystemService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            pending_polls: 0,
            page_size: 100,
        }
    }

    /// Newly created resources report "creating" for `polls` describe calls.
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn initial_state(&self) -> (LifecycleState, Option<usize>) {
        if self.pending_polls == 0 {
            (LifecycleState::Available, None)
        } else {
            (LifecycleState::Creating, Some(self.pending_polls))
        }
    }

    /// Seed a filesystem that stays in `state` until told otherwise.
    pub fn insert_filesystem(
        &self,
        token: &CreationToken,
        id: &str,
        state: LifecycleState,
    ) -> FilesystemId {
        let id = FilesystemId::new(id);
        self.state().filesystems.push(Stored {
            resource: FilesystemResource {
                id: id.clone(),
                creation_token: token.clone(),
                lifecycle_state: state,
                performance_mode: PerformanceMode::GeneralPurpose,
                tags: Vec::new(),
            },
            pending: None,
        });
        id
    }

    /// Seed a mount target that stays in `state` until told otherwise.
    pub fn insert_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        state: LifecycleState,
    ) -> String {
        let mut guard = self.state();
        guard.next_mount_target += 1;
        let id = format!("fsmt-{:08}", guard.next_mount_target);
        guard.mount_targets.push(Stored {
            resource: MountTarget {
                id: id.clone(),
                filesystem_id: filesystem_id.clone(),
                subnet_id: subnet_id.to_string(),
                lifecycle_state: state,
                security_groups: Vec::new(),
                ip_address: None,
            },
            pending: None,
        });
        id
    }

    /// Make a seeded filesystem or mount target turn available after
    /// `polls` more describe calls.
    pub fn settle_after(&self, resource_id: &str, polls: usize) {
        let mut guard = self.state();
        for stored in guard.filesystems.iter_mut() {
            if stored.resource.id.as_str() == resource_id {
                stored.pending = Some(polls);
            }
        }
        for stored in guard.mount_targets.iter_mut() {
            if stored.resource.id == resource_id {
                stored.pending = Some(polls);
            }
        }
    }

    pub fn tag_filesystem(&self, filesystem_id: &str, tag: Tag) {
        let mut guard = self.state();
        if let Some(stored) = guard
            .filesystems
            .iter_mut()
            .find(|stored| stored.resource.id.as_str() == filesystem_id)
        {
            stored.resource.tags.retain(|existing| existing.key != tag.key);
            stored.resource.tags.push(tag);
        }
    }

    /// Fail the next call of `operation` with `err`.
    pub fn fail_next(&self, operation: Operation, err: RemoteError) {
        self.state().failures.insert(operation, err);
    }

    /// Reject every mount target creation in `subnet_id`.
    pub fn reject_subnet(&self, subnet_id: &str) {
        self.state().rejected_subnets.insert(subnet_id.to_string());
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn filesystems(&self) -> Vec<FilesystemResource> {
        self.state()
            .filesystems
            .iter()
            .map(|stored| stored.resource.clone())
            .collect()
    }

    pub fn mount_targets_in(&self, filesystem_id: &FilesystemId, subnet_id: &str) -> usize {
        self.state()
            .mount_targets
            .iter()
            .filter(|stored| {
                stored.resource.filesystem_id == *filesystem_id
                    && stored.resource.subnet_id == subnet_id
            })
            .count()
    }
}

#[async_trait]
impl FilesystemService for InMemoryFilesystemService {
    async fn describe_filesystems_by_token(
        &self,
        token: &CreationToken,
    ) -> Result<Vec<FilesystemResource>, RemoteError> {
        let mut state = self.state();
        state.enter(Operation::DescribeFilesystems)?;

        Ok(state
            .filesystems
            .iter_mut()
            .filter(|stored| stored.resource.creation_token == *token)
            .map(|stored| {
                stored.observe(|fs| &mut fs.lifecycle_state);
                stored.resource.clone()
            })
            .collect())
    }

    async fn create_filesystem(
        &self,
        token: &CreationToken,
        performance_mode: PerformanceMode,
        tags: &[Tag],
    ) -> Result<FilesystemResource, RemoteError> {
        let (lifecycle_state, pending) = self.initial_state();
        let mut state = self.state();
        state.enter(Operation::CreateFilesystem)?;

        // Idempotent on the token, like the real service
        if let Some(existing) = state
            .filesystems
            .iter()
            .find(|stored| stored.resource.creation_token == *token)
        {
            return Ok(existing.resource.clone());
        }

        let filesystem = FilesystemResource {
            id: FilesystemId::new(token.as_str()),
            creation_token: token.clone(),
            lifecycle_state,
            performance_mode,
            tags: tags.to_vec(),
        };
        state.filesystems.push(Stored {
            resource: filesystem.clone(),
            pending,
        });
        Ok(filesystem)
    }

    async fn describe_mount_targets(
        &self,
        filesystem_id: &FilesystemId,
    ) -> Result<Vec<MountTarget>, RemoteError> {
        let mut state = self.state();
        state.enter(Operation::DescribeMountTargets)?;

        if !state
            .filesystems
            .iter()
            .any(|stored| stored.resource.id == *filesystem_id)
        {
            return Err(RemoteError::NotFound {
                operation: "DescribeMountTargets",
                resource: filesystem_id.to_string(),
            });
        }

        Ok(state
            .mount_targets
            .iter_mut()
            .filter(|stored| stored.resource.filesystem_id == *filesystem_id)
            .map(|stored| {
                stored.observe(|target| &mut target.lifecycle_state);
                stored.resource.clone()
            })
            .collect())
    }

    async fn create_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        security_groups: &[String],
    ) -> Result<MountTarget, RemoteError> {
        let (lifecycle_state, pending) = self.initial_state();
        let mut state = self.state();
        state.enter(Operation::CreateMountTarget)?;

        if state.rejected_subnets.contains(subnet_id) {
            return Err(RemoteError::Api {
                operation: "CreateMountTarget",
                code: Some("SubnetNotFound".to_string()),
                message: format!("subnet {} does not exist", subnet_id),
            });
        }
        if state
            .mount_targets
            .iter()
            .any(|stored| {
                stored.resource.filesystem_id == *filesystem_id
                    && stored.resource.subnet_id == subnet_id
            })
        {
            return Err(RemoteError::Api {
                operation: "CreateMountTarget",
                code: Some("MountTargetConflict".to_string()),
                message: format!("{} already has a mount target in {}", filesystem_id, subnet_id),
            });
        }

        state.next_mount_target += 1;
        let target = MountTarget {
            id: format!("fsmt-{:08}", state.next_mount_target),
            filesystem_id: filesystem_id.clone(),
            subnet_id: subnet_id.to_string(),
            lifecycle_state,
            security_groups: security_groups.to_vec(),
            ip_address: Some(format!("10.0.{}.10", state.next_mount_target % 256)),
        };
        state.mount_targets.push(Stored {
            resource: target.clone(),
            pending,
        });
        Ok(target)
    }

    async fn list_filesystems(&self, marker: Option<&str>) -> Result<FilesystemPage, RemoteError> {
        let mut state = self.state();
        state.enter(Operation::ListFilesystems)?;

        let start = match marker {
            Some(marker) => marker.parse::<usize>().map_err(|_| RemoteError::Api {
                operation: "DescribeFileSystems",
                code: Some("BadRequest".to_string()),
                message: format!("invalid marker {}", marker),
            })?,
            None => 0,
        };
        let end = (start + self.page_size).min(state.filesystems.len());

        Ok(FilesystemPage {
            filesystems: state.filesystems[start.min(end)..end]
                .iter()
                .map(|stored| stored.resource.clone())
                .collect(),
            next_marker: (end < state.filesystems.len()).then(|| end.to_string()),
        })
    }

    async fn tag_resource(
        &self,
        filesystem_id: &FilesystemId,
        tags: &[Tag],
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.enter(Operation::TagResource)?;

        let stored = state
            .filesystems
            .iter_mut()
            .find(|stored| stored.resource.id == *filesystem_id)
            .ok_or_else(|| RemoteError::NotFound {
                operation: "TagResource",
                resource: filesystem_id.to_string(),
            })?;

        for tag in tags {
            stored.resource.tags.retain(|existing| existing.key != tag.key);
            stored.resource.tags.push(tag.clone());
        }
        Ok(())
    }
}

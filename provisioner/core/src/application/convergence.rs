// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Convergence Loops
//!
//! Describe/create/poll cycles that drive one remote resource to the
//! "available" lifecycle state:
//!
//! - [`Converger::ensure_filesystem`]: exactly one filesystem per creation token
//! - [`Converger::ensure_mount_targets`]: exactly one mount target per subnet
//!
//! Both loops are re-entrant. Calling them again with the same inputs finds
//! the existing resource and never issues a second create. Once a create has
//! been attempted, only reads are retried. Polling runs at a fixed interval
//! inside a total wait budget and can be cancelled from outside.

use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::provisioner::ProvisionError;
use crate::domain::config::PollConfig;
use crate::domain::events::ProvisioningEvent;
use crate::domain::filesystem::{
    FilesystemId, FilesystemResource, LifecycleState, MountTarget, PerformanceMode, Tag, NAME_TAG,
};
use crate::domain::remote::FilesystemService;
use crate::domain::request::CreationToken;
use crate::infrastructure::event_bus::EventBus;

/// Fixed-cadence polling with a hard upper bound on total wait time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self::new(config.interval(), config.timeout())
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

/// Drives filesystems and mount targets to "available".
#[derive(Clone)]
pub struct Converger {
    service: Arc<dyn FilesystemService>,
    policy: PollPolicy,
    event_bus: Arc<EventBus>,
}

impl Converger {
    pub fn new(
        service: Arc<dyn FilesystemService>,
        policy: PollPolicy,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            service,
            policy,
            event_bus,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    // ------------------------------------------------------------------------
    // Filesystem
    // ------------------------------------------------------------------------

    /// Ensure one filesystem exists for `token` and wait until it is available.
    pub async fn ensure_filesystem(
        &self,
        token: &CreationToken,
        performance_mode: PerformanceMode,
        cancel: &CancellationToken,
    ) -> Result<FilesystemResource, ProvisionError> {
        let started = Instant::now();
        let resource = format!("filesystem {}", token);

        let mut filesystem = match self.find_filesystem(token).await? {
            Some(existing) => {
                info!(
                    "Found filesystem {} for token {} ({})",
                    existing.id, token, existing.lifecycle_state
                );
                existing
            }
            None => self.create_filesystem(token, performance_mode).await?,
        };
        let filesystem_id = filesystem.id.clone();

        loop {
            if filesystem.lifecycle_state.is_available() {
                info!("Filesystem {} is available: {}", filesystem.id, token);
                self.event_bus.publish(ProvisioningEvent::FilesystemAvailable {
                    token: token.clone(),
                    filesystem_id: filesystem.id.clone(),
                    available_at: Utc::now(),
                });
                return Ok(filesystem);
            }

            info!(
                "Waiting for filesystem to become ready: {} ({})",
                token, filesystem.lifecycle_state
            );
            self.pause(started, &resource, &filesystem.lifecycle_state, cancel)
                .await?;

            // Reads only from here on: the create has already been attempted.
            match self.find_filesystem(token).await? {
                Some(current) if current.id != filesystem_id => {
                    return Err(ProvisionError::AmbiguousState(format!(
                        "token {} moved from filesystem {} to {} while waiting",
                        token, filesystem_id, current.id
                    )));
                }
                Some(current) => filesystem = current,
                None => debug!("Filesystem {} not yet visible for token {}", filesystem_id, token),
            }
        }
    }

    /// Describe by token; more than one match is never resolved silently.
    async fn find_filesystem(
        &self,
        token: &CreationToken,
    ) -> Result<Option<FilesystemResource>, ProvisionError> {
        let mut filesystems = self
            .service
            .describe_filesystems_by_token(token)
            .await
            .map_err(|source| ProvisionError::Remote {
                context: format!("describing filesystems for token {}", token),
                source,
            })?;

        match filesystems.len() {
            0 => Ok(None),
            1 => Ok(filesystems.pop()),
            n => {
                let ids: Vec<String> = filesystems.iter().map(|fs| fs.id.to_string()).collect();
                Err(ProvisionError::AmbiguousState(format!(
                    "{} filesystems match token {}: {}",
                    n,
                    token,
                    ids.join(", ")
                )))
            }
        }
    }

    async fn create_filesystem(
        &self,
        token: &CreationToken,
        performance_mode: PerformanceMode,
    ) -> Result<FilesystemResource, ProvisionError> {
        info!("Creating filesystem {} ({})", token, performance_mode);

        let tags = [Tag::new(NAME_TAG, token.as_str())];
        let filesystem = self
            .service
            .create_filesystem(token, performance_mode, &tags)
            .await
            .map_err(|source| ProvisionError::Remote {
                context: format!("creating filesystem for token {}", token),
                source,
            })?;

        self.event_bus.publish(ProvisioningEvent::FilesystemCreated {
            token: token.clone(),
            filesystem_id: filesystem.id.clone(),
            created_at: Utc::now(),
        });

        Ok(filesystem)
    }

    // ------------------------------------------------------------------------
    // Mount targets
    // ------------------------------------------------------------------------

    /// Ensure `filesystem_id` has an available mount target in every subnet.
    ///
    /// Any subnet failing fails the whole call. With `concurrent` set the
    /// subnets converge in parallel and the first failure drops the rest;
    /// otherwise they converge one after another in the given order.
    pub async fn ensure_mount_targets(
        &self,
        filesystem_id: &FilesystemId,
        subnets: &[String],
        security_group: &str,
        concurrent: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<MountTarget>, ProvisionError> {
        if concurrent {
            return try_join_all(subnets.iter().map(|subnet| {
                self.ensure_mount_target(filesystem_id, subnet, security_group, cancel)
            }))
            .await;
        }

        let mut targets = Vec::with_capacity(subnets.len());
        for subnet in subnets {
            targets.push(
                self.ensure_mount_target(filesystem_id, subnet, security_group, cancel)
                    .await?,
            );
        }
        Ok(targets)
    }

    /// Converge the mount target of a single subnet.
    pub async fn ensure_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        security_group: &str,
        cancel: &CancellationToken,
    ) -> Result<MountTarget, ProvisionError> {
        let started = Instant::now();
        let resource = format!("mount target for {} in {}", filesystem_id, subnet_id);

        // An existing target is accepted in any state; the poll re-validates it.
        let mut target = match self.find_mount_target(filesystem_id, subnet_id).await? {
            Some(existing) => existing,
            None => {
                self.create_mount_target(filesystem_id, subnet_id, security_group)
                    .await?
            }
        };

        loop {
            if target.lifecycle_state.is_available() {
                info!(
                    "Mount target {} ({}) is available for filesystem {}",
                    target.id, subnet_id, filesystem_id
                );
                self.event_bus.publish(ProvisioningEvent::MountTargetAvailable {
                    filesystem_id: filesystem_id.clone(),
                    subnet_id: subnet_id.to_string(),
                    available_at: Utc::now(),
                });
                return Ok(target);
            }

            info!(
                "Waiting for mount target ({}) to become ready for filesystem: {} ({})",
                subnet_id, filesystem_id, target.lifecycle_state
            );
            self.pause(started, &resource, &target.lifecycle_state, cancel)
                .await?;

            match self.find_mount_target(filesystem_id, subnet_id).await? {
                Some(current) => target = current,
                None => debug!("Mount target {} not yet visible", target.id),
            }
        }
    }

    async fn find_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
    ) -> Result<Option<MountTarget>, ProvisionError> {
        let targets = self
            .service
            .describe_mount_targets(filesystem_id)
            .await
            .map_err(|source| ProvisionError::Remote {
                context: format!("describing mount targets of {}", filesystem_id),
                source,
            })?;

        let mut matching: Vec<MountTarget> = targets
            .into_iter()
            .filter(|target| target.subnet_id == subnet_id)
            .collect();

        if matching.len() > 1 {
            return Err(ProvisionError::AmbiguousState(format!(
                "filesystem {} has {} mount targets in subnet {}",
                filesystem_id,
                matching.len(),
                subnet_id
            )));
        }
        Ok(matching.pop())
    }

    async fn create_mount_target(
        &self,
        filesystem_id: &FilesystemId,
        subnet_id: &str,
        security_group: &str,
    ) -> Result<MountTarget, ProvisionError> {
        info!(
            "Creating mount target for filesystem {} in {} (security group {})",
            filesystem_id, subnet_id, security_group
        );

        let target = self
            .service
            .create_mount_target(filesystem_id, subnet_id, &[security_group.to_string()])
            .await
            .map_err(|source| ProvisionError::Remote {
                context: format!("creating mount target for {} in {}", filesystem_id, subnet_id),
                source,
            })?;

        self.event_bus.publish(ProvisioningEvent::MountTargetCreated {
            filesystem_id: filesystem_id.clone(),
            subnet_id: subnet_id.to_string(),
            mount_target_id: target.id.clone(),
            created_at: Utc::now(),
        });

        Ok(target)
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    /// Sleep one interval, or fail if the wait budget is spent or the caller
    /// cancelled.
    async fn pause(
        &self,
        started: Instant,
        resource: &str,
        last_state: &LifecycleState,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        let waited = started.elapsed();
        if waited >= self.policy.timeout {
            warn!(
                "Gave up on {} after {:?} (last state: {})",
                resource, waited, last_state
            );
            return Err(ProvisionError::NotReady {
                resource: resource.to_string(),
                last_state: last_state.to_string(),
                waited,
            });
        }

        let nap = self.policy.interval.min(self.policy.timeout - waited);
        tokio::select! {
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled {
                resource: resource.to_string(),
            }),
            _ = tokio::time::sleep(nap) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::efs::memory::{InMemoryFilesystemService, Operation};
    use crate::domain::remote::RemoteError;

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_secs(5))
    }

    fn converger(service: Arc<InMemoryFilesystemService>, policy: PollPolicy) -> Converger {
        Converger::new(service, policy, Arc::new(EventBus::with_default_capacity()))
    }

    #[tokio::test]
    async fn test_filesystem_created_and_polled_until_available() {
        let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(3));
        let converger = converger(service.clone(), fast_policy());
        let token = CreationToken::new("foo-bar");

        let filesystem = converger
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &CancellationToken::new())
            .await
            .unwrap();

        assert!(filesystem.lifecycle_state.is_available());
        assert_eq!(filesystem.name(), Some("foo-bar"));
        assert_eq!(service.calls(Operation::CreateFilesystem), 1);
        assert!(service.calls(Operation::DescribeFilesystems) >= 4);
    }

    #[tokio::test]
    async fn test_filesystem_is_idempotent() {
        let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(1));
        let converger = converger(service.clone(), fast_policy());
        let token = CreationToken::new("foo-bar");
        let cancel = CancellationToken::new();

        let first = converger
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &cancel)
            .await
            .unwrap();
        let second = converger
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &cancel)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.calls(Operation::CreateFilesystem), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_filesystems_are_rejected() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("foo-bar");
        service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        service.insert_filesystem(&token, "fs-2", LifecycleState::Available);

        let result = converger(service.clone(), fast_policy())
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ProvisionError::AmbiguousState(_))));
        assert_eq!(service.calls(Operation::CreateFilesystem), 0);
    }

    #[tokio::test]
    async fn test_filesystem_wait_is_bounded() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("stuck");
        service.insert_filesystem(&token, "fs-stuck", LifecycleState::Creating);

        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(30));
        let result = converger(service, policy)
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &CancellationToken::new())
            .await;

        match result {
            Err(ProvisionError::NotReady { last_state, waited, .. }) => {
                assert_eq!(last_state, "creating");
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_filesystem_wait_can_be_cancelled() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("stuck");
        service.insert_filesystem(&token, "fs-stuck", LifecycleState::Creating);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(600));
        let result = converger(service, policy)
            .ensure_filesystem(&token, PerformanceMode::GeneralPurpose, &cancel)
            .await;

        assert!(matches!(result, Err(ProvisionError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_describe_failure_is_surfaced() {
        let service = Arc::new(InMemoryFilesystemService::new());
        service.fail_next(Operation::DescribeFilesystems, RemoteError::api("DescribeFileSystems", "throttled"));

        let result = converger(service.clone(), fast_policy())
            .ensure_filesystem(
                &CreationToken::new("foo-bar"),
                PerformanceMode::GeneralPurpose,
                &CancellationToken::new(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ProvisionError::Remote { .. }));
        assert!(err.to_string().contains("describing filesystems for token foo-bar"));
        assert_eq!(service.calls(Operation::CreateFilesystem), 0);
    }

    #[tokio::test]
    async fn test_mount_targets_created_per_subnet() {
        let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(2));
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        let subnets = vec!["subnet-a".to_string(), "subnet-b".to_string()];

        let targets = converger(service.clone(), fast_policy())
            .ensure_mount_targets(&id, &subnets, "sg-1", false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].subnet_id, "subnet-a");
        assert_eq!(targets[1].subnet_id, "subnet-b");
        assert!(targets.iter().all(|t| t.lifecycle_state.is_available()));
        assert_eq!(service.calls(Operation::CreateMountTarget), 2);
        assert_eq!(service.mount_targets_in(&id, "subnet-a"), 1);
    }

    #[tokio::test]
    async fn test_mount_targets_are_idempotent() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        let subnets = vec!["subnet-a".to_string()];
        let converger = converger(service.clone(), fast_policy());
        let cancel = CancellationToken::new();

        converger
            .ensure_mount_targets(&id, &subnets, "sg-1", false, &cancel)
            .await
            .unwrap();
        converger
            .ensure_mount_targets(&id, &subnets, "sg-1", false, &cancel)
            .await
            .unwrap();

        assert_eq!(service.calls(Operation::CreateMountTarget), 1);
        assert_eq!(service.mount_targets_in(&id, "subnet-a"), 1);
    }

    #[tokio::test]
    async fn test_existing_mount_target_in_any_state_is_reused() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        let target_id = service.insert_mount_target(&id, "subnet-a", LifecycleState::Creating);
        service.settle_after(&target_id, 2);

        let target = converger(service.clone(), fast_policy())
            .ensure_mount_target(&id, "subnet-a", "sg-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(target.id, target_id);
        assert!(target.lifecycle_state.is_available());
        assert_eq!(service.calls(Operation::CreateMountTarget), 0);
    }

    #[tokio::test]
    async fn test_mount_target_failure_fails_all_subnets() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        service.reject_subnet("subnet-b");
        let subnets = vec![
            "subnet-a".to_string(),
            "subnet-b".to_string(),
            "subnet-c".to_string(),
        ];

        for concurrent in [false, true] {
            let result = converger(service.clone(), fast_policy())
                .ensure_mount_targets(&id, &subnets, "sg-1", concurrent, &CancellationToken::new())
                .await;

            let err = result.unwrap_err();
            assert!(err.to_string().contains("subnet-b"), "{}", err);
        }

        // Sequential mode stops at the failing subnet
        assert_eq!(service.mount_targets_in(&id, "subnet-a"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_mount_targets() {
        let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(1));
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        let subnets: Vec<String> = (0..4).map(|i| format!("subnet-{}", i)).collect();

        let targets = converger(service.clone(), fast_policy())
            .ensure_mount_targets(&id, &subnets, "sg-1", true, &CancellationToken::new())
            .await
            .unwrap();

        let mut seen: Vec<&str> = targets.iter().map(|t| t.subnet_id.as_str()).collect();
        seen.sort();
        assert_eq!(seen, vec!["subnet-0", "subnet-1", "subnet-2", "subnet-3"]);
        assert_eq!(service.calls(Operation::CreateMountTarget), 4);
    }

    #[tokio::test]
    async fn test_duplicate_mount_targets_are_ambiguous() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("foo-bar");
        let id = service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
        service.insert_mount_target(&id, "subnet-a", LifecycleState::Available);
        service.insert_mount_target(&id, "subnet-a", LifecycleState::Available);

        let result = converger(service, fast_policy())
            .ensure_mount_target(&id, "subnet-a", "sg-1", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ProvisionError::AmbiguousState(_))));
    }
}

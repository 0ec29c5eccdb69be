// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Provisioner Application Service
//!
//! Sequences one reconciliation attempt:
//!
//! ```text
//! Naming -> FilesystemConverging -> MountTargetsConverging -> Done
//!    \              \                        \
//!     +--------------+------------------------+--> Error
//! ```
//!
//! There is no retry across steps. A failure anywhere ends the attempt and
//! the external controller re-invokes the whole thing; that is safe because
//! every step converges onto the same remote resources given the same request.
//!
//! # Deletion
//!
//! Deletion never removes remote resources. Filesystems are retained by
//! policy and cleaning them up is left to a separate process.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::convergence::{Converger, PollPolicy};
use crate::application::descriptor::{build_descriptor, DescriptorError};
use crate::application::naming::{NameTemplate, NamingError};
use crate::domain::config::{ConfigError, ProvisionerConfig};
use crate::domain::events::ProvisioningEvent;
use crate::domain::remote::{FilesystemService, RemoteError};
use crate::domain::request::{CreationToken, ProvisioningRequest, RequestError};
use crate::domain::volume::VolumeDescriptor;
use crate::infrastructure::event_bus::EventBus;

// ============================================================================
// Errors
// ============================================================================

/// Why a reconciliation attempt failed.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("naming failed: {0}")]
    Naming(#[from] NamingError),

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("ambiguous remote state: {0}")]
    AmbiguousState(String),

    #[error("{resource} did not become available within {waited:?} (last state: {last_state})")]
    NotReady {
        resource: String,
        last_state: String,
        waited: Duration,
    },

    #[error("cancelled while waiting for {resource}")]
    Cancelled { resource: String },

    #[error("cannot build volume descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

impl ProvisionError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Naming(_) => "naming",
            Self::Remote { .. } => "remote",
            Self::AmbiguousState(_) => "ambiguous_state",
            Self::NotReady { .. } => "not_ready",
            Self::Cancelled { .. } => "cancelled",
            Self::Descriptor(_) => "descriptor",
        }
    }
}

/// Step of a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Naming,
    FilesystemConverging,
    MountTargetsConverging,
    Done,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Naming => "naming",
            Self::FilesystemConverging => "filesystem_converging",
            Self::MountTargetsConverging => "mount_targets_converging",
            Self::Done => "done",
        })
    }
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Converge the remote resources for `request` and describe the volume.
    async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<VolumeDescriptor, ProvisionError>;

    /// Same as [`Provisioner::provision`], aborting any poll once `cancel` fires.
    async fn provision_with_cancel(
        &self,
        request: &ProvisioningRequest,
        cancel: CancellationToken,
    ) -> Result<VolumeDescriptor, ProvisionError>;

    /// Release a volume. Always succeeds and never touches the remote service.
    async fn delete(&self, volume_name: &str) -> Result<(), ProvisionError>;

    /// Creation token the configured template yields for `request`.
    fn creation_token(&self, request: &ProvisioningRequest) -> Result<CreationToken, ProvisionError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardProvisioner {
    config: ProvisionerConfig,
    template: NameTemplate,
    converger: Converger,
    event_bus: Arc<EventBus>,
    // Serialises attempts for the same token within this process
    token_locks: DashMap<CreationToken, Arc<Mutex<()>>>,
}

impl StandardProvisioner {
    pub fn new(
        config: ProvisionerConfig,
        service: Arc<dyn FilesystemService>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let template = NameTemplate::parse(&config.format)
            .map_err(|e| ConfigError::Invalid(vec![format!("format: {}", e)]))?;
        let policy = PollPolicy::from(&config.poll);

        Ok(Self::with_policy(config, template, service, event_bus, policy))
    }

    /// Construct with an explicit poll policy (sub-second intervals in tests).
    pub fn with_policy(
        config: ProvisionerConfig,
        template: NameTemplate,
        service: Arc<dyn FilesystemService>,
        event_bus: Arc<EventBus>,
        policy: PollPolicy,
    ) -> Self {
        let converger = Converger::new(service, policy, event_bus.clone());
        Self {
            config,
            template,
            converger,
            event_bus,
            token_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    async fn reconcile(
        &self,
        request: &ProvisioningRequest,
        token: &CreationToken,
        stage: &mut ReconcileStage,
        cancel: &CancellationToken,
    ) -> Result<VolumeDescriptor, ProvisionError> {
        *stage = ReconcileStage::FilesystemConverging;
        let filesystem = self
            .converger
            .ensure_filesystem(token, self.config.performance, cancel)
            .await?;

        *stage = ReconcileStage::MountTargetsConverging;
        self.converger
            .ensure_mount_targets(
                &filesystem.id,
                &self.config.subnets,
                &self.config.security_group,
                self.config.concurrent_mount_targets,
                cancel,
            )
            .await?;

        let descriptor = build_descriptor(&filesystem, request, &self.config.region)?;
        *stage = ReconcileStage::Done;
        Ok(descriptor)
    }

    fn token_lock(&self, token: &CreationToken) -> Arc<Mutex<()>> {
        self.token_locks
            .entry(token.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_token_lock(&self, token: &CreationToken) {
        // Drop the entry once nobody else holds or waits on it
        self.token_locks
            .remove_if(token, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn record(&self, result: &'static str, started: Instant) {
        metrics::counter!("efs_provisioner_provision_total", "result" => result).increment(1);
        metrics::histogram!("efs_provisioner_provision_duration_seconds")
            .record(started.elapsed().as_secs_f64());
    }

    fn fail(
        &self,
        token: Option<&CreationToken>,
        stage: ReconcileStage,
        err: ProvisionError,
        started: Instant,
    ) -> ProvisionError {
        error!(
            "Provisioning failed at {} for {}: {}",
            stage,
            token.map(CreationToken::as_str).unwrap_or("<unnamed>"),
            err
        );
        self.record(err.kind(), started);
        self.event_bus.publish(ProvisioningEvent::ProvisioningFailed {
            token: token.cloned(),
            error: format!("{}: {}", stage, err),
            failed_at: Utc::now(),
        });
        err
    }
}

/// Removes the token's lock entry when an attempt ends, including when the
/// attempt's future is dropped part way through.
struct TokenLockRelease<'a> {
    provisioner: &'a StandardProvisioner,
    token: &'a CreationToken,
}

impl Drop for TokenLockRelease<'_> {
    fn drop(&mut self) {
        self.provisioner.release_token_lock(self.token);
    }
}

#[async_trait]
impl Provisioner for StandardProvisioner {
    async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<VolumeDescriptor, ProvisionError> {
        self.provision_with_cancel(request, CancellationToken::new())
            .await
    }

    async fn provision_with_cancel(
        &self,
        request: &ProvisioningRequest,
        cancel: CancellationToken,
    ) -> Result<VolumeDescriptor, ProvisionError> {
        let started = Instant::now();
        let mut stage = ReconcileStage::Naming;

        let token = match request
            .validate()
            .map_err(ProvisionError::from)
            .and_then(|()| self.creation_token(request))
        {
            Ok(token) => token,
            Err(e) => return Err(self.fail(None, stage, e, started)),
        };
        info!(
            "Provisioning volume {}/{} as {}",
            request.namespace, request.pv_name, token
        );

        let result = {
            // Dropped in reverse order: guard, lock, then the map entry
            let _release = TokenLockRelease {
                provisioner: self,
                token: &token,
            };
            let lock = self.token_lock(&token);
            let _guard = lock.lock().await;
            self.reconcile(request, &token, &mut stage, &cancel).await
        };

        match result {
            Ok(descriptor) => {
                info!(
                    "Provisioned volume {} for {} ({})",
                    descriptor.name, token, descriptor.server
                );
                self.record("success", started);
                self.event_bus.publish(ProvisioningEvent::VolumeProvisioned {
                    token: token.clone(),
                    volume_name: descriptor.name.clone(),
                    server: descriptor.server.clone(),
                    provisioned_at: Utc::now(),
                });
                Ok(descriptor)
            }
            Err(e) => Err(self.fail(Some(&token), stage, e, started)),
        }
    }

    async fn delete(&self, volume_name: &str) -> Result<(), ProvisionError> {
        warn!(
            "Retaining filesystem for volume {}: remote resources are never deleted by the provisioner",
            volume_name
        );
        self.event_bus.publish(ProvisioningEvent::VolumeDeleteSkipped {
            volume_name: volume_name.to_string(),
            skipped_at: Utc::now(),
        });
        Ok(())
    }

    fn creation_token(&self, request: &ProvisioningRequest) -> Result<CreationToken, ProvisionError> {
        Ok(self.template.render(request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filesystem::LifecycleState;
    use crate::domain::request::AccessMode;
    use crate::infrastructure::efs::memory::{InMemoryFilesystemService, Operation};

    fn config() -> ProvisionerConfig {
        ProvisionerConfig {
            security_group: "sg-1".to_string(),
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            ..ProvisionerConfig::default()
        }
    }

    fn provisioner(service: Arc<InMemoryFilesystemService>) -> StandardProvisioner {
        let config = config();
        let template = NameTemplate::parse(&config.format).unwrap();
        StandardProvisioner::with_policy(
            config,
            template,
            service,
            Arc::new(EventBus::with_default_capacity()),
            PollPolicy::new(Duration::from_millis(1), Duration::from_secs(5)),
        )
    }

    fn request() -> ProvisioningRequest {
        ProvisioningRequest::new("namespace", "test")
            .with_access_modes([AccessMode::ReadWriteMany])
    }

    #[tokio::test]
    async fn test_provision() {
        let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(2));
        let descriptor = provisioner(service.clone()).provision(&request()).await.unwrap();

        assert_eq!(descriptor.name, "namespace-test");
        assert_eq!(
            descriptor.server,
            "namespace-test.efs.ap-southeast-2.amazonaws.com"
        );
        assert_eq!(service.calls(Operation::CreateFilesystem), 1);
        assert_eq!(service.calls(Operation::CreateMountTarget), 2);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let service: Arc<dyn FilesystemService> = Arc::new(InMemoryFilesystemService::new());
        let result = StandardProvisioner::new(
            ProvisionerConfig::default(),
            service,
            Arc::new(EventBus::default()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_remote_calls() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let result = provisioner(service.clone())
            .provision(&ProvisioningRequest::new("namespace", "test"))
            .await;

        assert!(matches!(
            result,
            Err(ProvisionError::InvalidRequest(RequestError::NoAccessModes))
        ));
        assert_eq!(service.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_a_noop() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let provisioner = provisioner(service.clone());
        let mut events = provisioner.event_bus.subscribe();

        provisioner.delete("fs-anything").await.unwrap();

        assert_eq!(service.total_calls(), 0);
        assert!(matches!(
            events.try_recv(),
            Ok(ProvisioningEvent::VolumeDeleteSkipped { .. })
        ));
    }

    #[test]
    fn test_token_lock_is_released() {
        let provisioner = provisioner(Arc::new(InMemoryFilesystemService::new()));
        let token = CreationToken::new("foo-bar");

        let lock = provisioner.token_lock(&token);
        assert!(Arc::ptr_eq(&lock, &provisioner.token_lock(&token)));

        // Still held by `lock`
        provisioner.release_token_lock(&token);
        assert_eq!(provisioner.token_locks.len(), 1);

        drop(lock);
        provisioner.release_token_lock(&token);
        assert!(provisioner.token_locks.is_empty());
    }

    #[tokio::test]
    async fn test_token_lock_is_released_when_attempt_is_dropped() {
        let service = Arc::new(InMemoryFilesystemService::new());
        let token = CreationToken::new("namespace-test");
        service.insert_filesystem(&token, "fs-1", LifecycleState::Creating);
        let provisioner = provisioner(service);

        // The filesystem never settles, so the attempt is still polling when
        // the timeout drops it.
        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            provisioner.provision(&request()),
        )
        .await;
        assert!(attempt.is_err());

        assert!(provisioner.token_locks.is_empty());
    }
}

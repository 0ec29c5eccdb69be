// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end reconciliation against the in-memory filesystem service.
//!
//! Covers the properties the external controller relies on:
//! - the same request always lands on the same filesystem
//! - retries never create duplicates
//! - partial mount-target attachment is never reported as success
//! - ambiguous remote state stops the attempt before mount targets
//! - deletion never calls the remote service

use std::sync::Arc;
use std::time::Duration;

use efs_provisioner_core::application::convergence::PollPolicy;
use efs_provisioner_core::application::naming::{format_name, NameTemplate};
use efs_provisioner_core::application::provisioner::{
    ProvisionError, Provisioner, StandardProvisioner,
};
use efs_provisioner_core::domain::config::ProvisionerConfig;
use efs_provisioner_core::domain::events::ProvisioningEvent;
use efs_provisioner_core::domain::filesystem::LifecycleState;
use efs_provisioner_core::domain::remote::RemoteError;
use efs_provisioner_core::domain::request::{AccessMode, CreationToken, ProvisioningRequest};
use efs_provisioner_core::domain::volume::{ReclaimPolicy, CAPACITY_SENTINEL};
use efs_provisioner_core::infrastructure::efs::memory::{InMemoryFilesystemService, Operation};
use efs_provisioner_core::infrastructure::event_bus::EventBus;
use tokio_util::sync::CancellationToken;

const SUBNETS: [&str; 3] = ["subnet-a", "subnet-b", "subnet-c"];

fn config(concurrent: bool) -> ProvisionerConfig {
    ProvisionerConfig {
        security_group: "sg-xxxxxxxx".to_string(),
        subnets: SUBNETS.iter().map(|s| s.to_string()).collect(),
        concurrent_mount_targets: concurrent,
        ..ProvisionerConfig::default()
    }
}

fn provisioner_with(
    service: Arc<InMemoryFilesystemService>,
    config: ProvisionerConfig,
    timeout: Duration,
) -> StandardProvisioner {
    let template = NameTemplate::parse(&config.format).expect("default template parses");
    StandardProvisioner::with_policy(
        config,
        template,
        service,
        Arc::new(EventBus::with_default_capacity()),
        PollPolicy::new(Duration::from_millis(1), timeout),
    )
}

fn provisioner(service: Arc<InMemoryFilesystemService>) -> StandardProvisioner {
    provisioner_with(service, config(false), Duration::from_secs(5))
}

fn request(namespace: &str, pv_name: &str) -> ProvisioningRequest {
    ProvisioningRequest::new(namespace, pv_name).with_access_modes([AccessMode::ReadWriteMany])
}

#[test]
fn test_naming_determinism() {
    let template = "{namespace}-{pvName}";
    let a = format_name(template, &request("foo", "bar")).expect("renders");
    let b = format_name(template, &request("foo", "bar")).expect("renders");
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "foo-bar");

    assert_ne!(format_name(template, &request("foo", "baz")).expect("renders"), a);
    assert_ne!(format_name(template, &request("qux", "bar")).expect("renders"), a);

    let claimed = request("foo", "bar").with_claim_name("baz");
    assert_eq!(
        format_name("{namespace}-{pvcName}", &claimed).expect("renders").as_str(),
        "foo-baz"
    );
}

#[tokio::test]
async fn test_provision_descriptor() {
    let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(3));
    let provisioner = provisioner(service.clone());

    let descriptor = provisioner
        .provision(&request("namespace", "test"))
        .await
        .expect("provisioning succeeds");

    assert_eq!(descriptor.name, "namespace-test");
    assert_eq!(
        descriptor.server,
        "namespace-test.efs.ap-southeast-2.amazonaws.com"
    );
    assert_eq!(descriptor.path, "/");
    assert_eq!(descriptor.reclaim_policy, ReclaimPolicy::Retain);
    assert_eq!(descriptor.capacity, CAPACITY_SENTINEL);
    assert_eq!(descriptor.access_modes, vec![AccessMode::ReadWriteMany]);

    let id = service.filesystems()[0].id.clone();
    for subnet in SUBNETS {
        assert_eq!(service.mount_targets_in(&id, subnet), 1, "{}", subnet);
    }
    assert_eq!(service.filesystems()[0].name(), Some("namespace-test"));
}

#[tokio::test]
async fn test_retry_is_idempotent() {
    let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(2));
    let provisioner = provisioner(service.clone());
    let request = request("namespace", "test");

    let first = provisioner.provision(&request).await.expect("first attempt");
    let second = provisioner.provision(&request).await.expect("second attempt");

    assert_eq!(first, second);
    assert_eq!(service.calls(Operation::CreateFilesystem), 1);
    assert_eq!(service.calls(Operation::CreateMountTarget), SUBNETS.len());
    assert_eq!(service.filesystems().len(), 1);
}

#[tokio::test]
async fn test_partial_attachment_is_a_failure_and_retry_recovers() {
    let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(1));
    let provisioner = provisioner(service.clone());
    let request = request("namespace", "test");

    service.fail_next(
        Operation::CreateMountTarget,
        RemoteError::api("CreateMountTarget", "NetworkInterfaceLimitExceeded"),
    );
    let err = provisioner
        .provision(&request)
        .await
        .expect_err("first mount target fails");
    assert!(matches!(err, ProvisionError::Remote { .. }));
    assert!(err.to_string().contains("subnet-a"), "{}", err);

    // The filesystem survives and is reused by the retry
    let descriptor = provisioner.provision(&request).await.expect("retry succeeds");
    assert_eq!(descriptor.name, "namespace-test");
    assert_eq!(service.calls(Operation::CreateFilesystem), 1);
}

#[tokio::test]
async fn test_rejected_subnet_fails_whole_request() {
    for concurrent in [false, true] {
        let service = Arc::new(InMemoryFilesystemService::new());
        service.reject_subnet("subnet-b");
        let provisioner = provisioner_with(service, config(concurrent), Duration::from_secs(5));

        let result = provisioner.provision(&request("namespace", "test")).await;
        assert!(result.is_err(), "concurrent={}", concurrent);
    }
}

#[tokio::test]
async fn test_ambiguous_filesystems_stop_before_mount_targets() {
    let service = Arc::new(InMemoryFilesystemService::new());
    let token = CreationToken::new("namespace-test");
    service.insert_filesystem(&token, "fs-1", LifecycleState::Available);
    service.insert_filesystem(&token, "fs-2", LifecycleState::Available);

    let err = provisioner(service.clone())
        .provision(&request("namespace", "test"))
        .await
        .expect_err("ambiguous");

    assert!(matches!(err, ProvisionError::AmbiguousState(_)));
    assert_eq!(service.calls(Operation::CreateFilesystem), 0);
    assert_eq!(service.calls(Operation::DescribeMountTargets), 0);
    assert_eq!(service.calls(Operation::CreateMountTarget), 0);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let service = Arc::new(InMemoryFilesystemService::new());
    service.insert_filesystem(
        &CreationToken::new("namespace-test"),
        "fs-stuck",
        LifecycleState::Creating,
    );
    let provisioner = provisioner_with(service, config(false), Duration::from_millis(20));

    let err = provisioner
        .provision(&request("namespace", "test"))
        .await
        .expect_err("never available");

    match err {
        ProvisionError::NotReady { resource, last_state, .. } => {
            assert!(resource.contains("namespace-test"));
            assert_eq!(last_state, "creating");
        }
        other => panic!("expected NotReady, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation() {
    let service = Arc::new(InMemoryFilesystemService::new());
    service.insert_filesystem(
        &CreationToken::new("namespace-test"),
        "fs-stuck",
        LifecycleState::Creating,
    );
    let provisioner = provisioner_with(service, config(false), Duration::from_secs(600));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = provisioner
        .provision_with_cancel(&request("namespace", "test"), cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, ProvisionError::Cancelled { .. }));
}

#[tokio::test]
async fn test_concurrent_requests_for_one_token_create_once() {
    let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(2));
    let provisioner = Arc::new(provisioner(service.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provisioner = provisioner.clone();
            tokio::spawn(async move { provisioner.provision(&request("namespace", "test")).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task").expect("provisioned");
    }

    assert_eq!(service.calls(Operation::CreateFilesystem), 1);
    assert_eq!(service.calls(Operation::CreateMountTarget), SUBNETS.len());
}

#[tokio::test]
async fn test_delete_is_a_noop() {
    let service = Arc::new(InMemoryFilesystemService::new());
    let provisioner = provisioner(service.clone());

    provisioner
        .delete("namespace-test")
        .await
        .expect("delete always succeeds");
    provisioner
        .delete("fs-does-not-exist")
        .await
        .expect("delete always succeeds");

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_events_are_published() {
    let service = Arc::new(InMemoryFilesystemService::new().with_pending_polls(1));
    let provisioner = provisioner(service);
    let token = CreationToken::new("namespace-test");
    let mut events = provisioner.event_bus().subscribe_token(token);

    provisioner
        .provision(&request("namespace", "test"))
        .await
        .expect("provisioned");

    let events = events.drain();
    assert!(matches!(events.first(), Some(ProvisioningEvent::FilesystemCreated { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProvisioningEvent::FilesystemAvailable { .. })));
    assert!(matches!(events.last(), Some(ProvisioningEvent::VolumeProvisioned { .. })));
}

#[tokio::test]
async fn test_failure_event_names_the_stage() {
    let service = Arc::new(InMemoryFilesystemService::new());
    service.fail_next(
        Operation::DescribeFilesystems,
        RemoteError::api("DescribeFileSystems", "throttled"),
    );
    let provisioner = provisioner(service);
    let mut events = provisioner.event_bus().subscribe();

    assert!(provisioner.provision(&request("namespace", "test")).await.is_err());

    let failure = events
        .drain()
        .into_iter()
        .find_map(|event| match event {
            ProvisioningEvent::ProvisioningFailed { error, .. } => Some(error),
            _ => None,
        })
        .expect("failure event");
    assert!(failure.starts_with("filesystem_converging"), "{}", failure);
}

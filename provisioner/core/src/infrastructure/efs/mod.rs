// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem Service Infrastructure Module
//!
//! Concrete implementations of the [`FilesystemService`] trait.

pub mod aws;
pub mod memory;

pub use aws::EfsAdapter;
pub use memory::InMemoryFilesystemService;

use std::sync::Arc;
use tracing::info;

use crate::domain::config::BackendKind;
use crate::domain::remote::FilesystemService;

/// Factory function to create the filesystem service from configuration
pub async fn create_filesystem_service(
    backend: BackendKind,
    region: &str,
) -> Arc<dyn FilesystemService> {
    match backend {
        BackendKind::Aws => {
            info!("Using Amazon EFS in {}", region);
            Arc::new(EfsAdapter::from_env(region).await)
        }
        BackendKind::Memory => {
            info!("Using in-memory filesystem service (nothing is provisioned)");
            Arc::new(InMemoryFilesystemService::new().with_pending_polls(1))
        }
    }
}

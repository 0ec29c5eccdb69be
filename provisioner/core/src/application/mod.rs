// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

pub mod naming;
pub mod convergence;
pub mod descriptor;
pub mod provisioner;
pub mod tagger;
pub mod mount_reaper;

// Re-export use cases for convenience
pub use convergence::{Converger, PollPolicy};
pub use descriptor::build_descriptor;
pub use mount_reaper::{MountReaper, ReapReport};
pub use naming::{format_name, NameTemplate, NamingError};
pub use provisioner::{ProvisionError, Provisioner, ReconcileStage, StandardProvisioner};
pub use tagger::{tag_untagged, TagReport};

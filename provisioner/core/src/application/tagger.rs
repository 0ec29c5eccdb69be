// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Bulk tagging of every filesystem in the account.
//!
//! Used to backfill billing or ownership tags onto filesystems that were
//! provisioned before the tag existed.

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::filesystem::Tag;
use crate::domain::remote::{FilesystemService, RemoteError};

/// Outcome of one tagging run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagReport {
    /// Filesystems seen across all pages
    pub examined: usize,
    /// Filesystems that already carried the tag
    pub skipped: usize,
    /// Filesystem ids that were tagged during this run
    pub tagged: Vec<String>,
}

/// Apply `key=value` to every filesystem that does not carry it yet.
///
/// Stops at the first remote error; filesystems tagged before the failure
/// stay tagged and a rerun skips them.
pub async fn tag_untagged(
    service: &dyn FilesystemService,
    key: &str,
    value: &str,
) -> Result<TagReport, RemoteError> {
    let tag = Tag::new(key, value);
    let mut report = TagReport::default();
    let mut marker: Option<String> = None;

    loop {
        let page = service.list_filesystems(marker.as_deref()).await?;

        for filesystem in page.filesystems {
            report.examined += 1;

            if filesystem.has_tag(key, value) {
                debug!("Skipping {}: already tagged {}={}", filesystem.id, key, value);
                report.skipped += 1;
                continue;
            }

            info!("Tagging {} with {}={}", filesystem.id, key, value);
            service
                .tag_resource(&filesystem.id, std::slice::from_ref(&tag))
                .await?;
            report.tagged.push(filesystem.id.to_string());
        }

        match page.next_marker {
            Some(next) if !next.is_empty() => marker = Some(next),
            _ => break,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filesystem::LifecycleState;
    use crate::domain::request::CreationToken;
    use crate::infrastructure::efs::memory::{InMemoryFilesystemService, Operation};

    #[tokio::test]
    async fn test_tag_untagged_across_pages() {
        let service = InMemoryFilesystemService::new().with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            service.insert_filesystem(&CreationToken::new(name), &format!("fs-{}", name), LifecycleState::Available);
        }
        service.tag_filesystem("fs-c", Tag::new("billing", "skpr"));

        let report = tag_untagged(&service, "billing", "skpr").await.unwrap();

        assert_eq!(report.examined, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.tagged, vec!["fs-a", "fs-b", "fs-d", "fs-e"]);
        assert_eq!(service.calls(Operation::ListFilesystems), 3);

        // A second run has nothing left to do
        let report = tag_untagged(&service, "billing", "skpr").await.unwrap();
        assert_eq!(report.skipped, 5);
        assert!(report.tagged.is_empty());
    }

    #[tokio::test]
    async fn test_tag_failure_aborts() {
        let service = InMemoryFilesystemService::new();
        service.insert_filesystem(&CreationToken::new("a"), "fs-a", LifecycleState::Available);
        service.fail_next(Operation::TagResource, RemoteError::api("TagResource", "denied"));

        let err = tag_untagged(&service, "billing", "skpr").await.unwrap_err();
        assert_eq!(err.operation(), "TagResource");
    }
}

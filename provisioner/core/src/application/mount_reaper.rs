// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Mount Reaper
//!
//! Companion loop that kills NFS mount helpers stuck in uninterruptible
//! sleep. A `mount.nfs` blocked on an unreachable server never returns and
//! pins the kubelet's mount attempt; killing it lets the platform retry.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Periodic sweep of the host process table
//! - **Collaborators:** [`ProcessTable`] (sysinfo in production)
//!
//! Shares nothing with the provisioner.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::config::{ConfigError, ReaperConfig};
use crate::domain::events::ProvisioningEvent;
use crate::domain::process::{ProcessError, ProcessState, ProcessTable};
use crate::infrastructure::event_bus::EventBus;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Processes whose executable matched
    pub examined: usize,
    pub killed: Vec<u32>,
    /// Matching processes that were not stuck
    pub skipped: usize,
    /// Matching processes whose state could not be read or that survived the kill
    pub failed: usize,
}

pub struct MountReaper {
    table: Box<dyn ProcessTable>,
    executable: String,
    interval: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl MountReaper {
    /// Fails when the settings cannot drive a sweep loop (zero interval,
    /// empty executable name).
    pub fn new(table: Box<dyn ProcessTable>, config: &ReaperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            table,
            executable: config.executable.clone(),
            interval: config.interval(),
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Examine every matching process once and kill the stuck ones.
    pub fn sweep(&mut self) -> Result<ReapReport, ProcessError> {
        let mut report = ReapReport::default();

        let candidates: Vec<_> = self
            .table
            .processes()?
            .into_iter()
            .filter(|process| process.executable == self.executable)
            .collect();

        for process in candidates {
            report.examined += 1;

            let state = match self.table.state(process.pid) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Failed to read state of process {}: {}", process.pid, e);
                    report.failed += 1;
                    continue;
                }
            };

            if state != ProcessState::UninterruptibleSleep {
                debug!(
                    "Skipping process {} ({}) in state {}",
                    process.pid, process.executable, state
                );
                report.skipped += 1;
                continue;
            }

            info!(
                "Killing process {} ({}) stuck in state {}",
                process.pid, process.executable, state
            );
            match self.table.kill(process.pid) {
                Ok(()) => {
                    metrics::counter!("efs_provisioner_reaped_processes_total").increment(1);
                    if let Some(event_bus) = &self.event_bus {
                        event_bus.publish(ProvisioningEvent::MountProcessReaped {
                            pid: process.pid,
                            executable: process.executable.clone(),
                            reaped_at: Utc::now(),
                        });
                    }
                    report.killed.push(process.pid);
                }
                Err(e) => {
                    error!("Failed to kill process {}: {}", process.pid, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweep on a fixed cadence until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Watching for stuck {} processes every {:?}",
            self.executable, self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Mount reaper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.sweep() {
                Ok(report) if !report.killed.is_empty() || report.failed > 0 => {
                    info!(
                        "Reaped {} of {} {} processes ({} failed)",
                        report.killed.len(),
                        report.examined,
                        self.executable,
                        report.failed
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping sweep: {}", e),
            }
        }
    }
}

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! [`ProcessTable`] backed by `sysinfo`.

use sysinfo::{Pid, ProcessStatus, Signal, System};

use crate::domain::process::{ProcessError, ProcessInfo, ProcessState, ProcessTable};

pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes(&mut self) -> Result<Vec<ProcessInfo>, ProcessError> {
        self.system.refresh_processes();

        Ok(self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                executable: process.name().to_string(),
            })
            .collect())
    }

    fn state(&self, pid: u32) -> Result<ProcessState, ProcessError> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or(ProcessError::NotFound(pid))?;

        Ok(match process.status() {
            ProcessStatus::Run => ProcessState::Running,
            ProcessStatus::Sleep | ProcessStatus::Idle => ProcessState::Sleeping,
            ProcessStatus::UninterruptibleDiskSleep => ProcessState::UninterruptibleSleep,
            ProcessStatus::Stop => ProcessState::Stopped,
            ProcessStatus::Zombie => ProcessState::Zombie,
            other => ProcessState::Other(other.to_string()),
        })
    }

    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or(ProcessError::NotFound(pid))?;

        match process.kill_with(Signal::Kill) {
            Some(true) => Ok(()),
            Some(false) => Err(ProcessError::Kill {
                pid,
                reason: "signal was not delivered".to_string(),
            }),
            None => Err(ProcessError::Kill {
                pid,
                reason: "SIGKILL is not supported on this platform".to_string(),
            }),
        }
    }
}

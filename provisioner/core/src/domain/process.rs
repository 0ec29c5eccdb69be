// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Host process table as seen by the mount reaper.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimal view of a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Executable name (not the full path)
    pub executable: String,
}

/// Scheduler state of a process, as in the `S` column of `ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Running,
    Sleeping,
    /// `D`: blocked in the kernel, typically on I/O to a dead NFS server
    UninterruptibleSleep,
    Stopped,
    Zombie,
    Other(String),
}

impl ProcessState {
    pub fn code(&self) -> &str {
        match self {
            Self::Running => "R",
            Self::Sleeping => "S",
            Self::UninterruptibleSleep => "D",
            Self::Stopped => "T",
            Self::Zombie => "Z",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Access to the local process table.
pub trait ProcessTable: Send {
    /// Take a fresh snapshot and return every process in it.
    fn processes(&mut self) -> Result<Vec<ProcessInfo>, ProcessError>;

    /// State of `pid` in the latest snapshot.
    fn state(&self, pid: u32) -> Result<ProcessState, ProcessError>;

    /// Send SIGKILL to `pid`.
    fn kill(&self, pid: u32) -> Result<(), ProcessError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("failed to list processes: {0}")]
    List(String),

    #[error("process {0} not found")]
    NotFound(u32),

    #[error("failed to kill process {pid}: {reason}")]
    Kill { pid: u32, reason: String },
}

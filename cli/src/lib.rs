// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! EFS provisioner CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Argument parsing, command handlers and logging setup

pub mod commands;
pub mod logging;

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! EFS Provisioner Core
//!
//! Turns storage requests from an orchestration platform into available
//! EFS filesystems with a mount target in every configured subnet.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, reconciler, remote adapters and HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;

// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Domain
//!
//! Value objects and collaborator contracts shared by every layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Requests, remote resources, descriptors and the traits
//!   that isolate the reconciler from AWS and the host OS

pub mod config;
pub mod events;
pub mod filesystem;
pub mod process;
pub mod remote;
pub mod request;
pub mod volume;

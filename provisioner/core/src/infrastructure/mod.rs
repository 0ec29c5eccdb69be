// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

pub mod efs;
pub mod event_bus;
pub mod process_table;

pub use efs::create_filesystem_service;
pub use event_bus::EventBus;

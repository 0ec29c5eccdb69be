// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! # Presentation Layer (`efs-provisioner-core`)
//!
//! HTTP surface through which a controller submits provisioning requests.
//! **No reconciliation logic lives here**; every handler delegates to the
//! [`Provisioner`](crate::application::provisioner::Provisioner).
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Volume provision/delete endpoints and health |

pub mod api;

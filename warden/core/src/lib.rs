// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Warden Core
//!
//! Capability-based authorization core for the platform: plugin capability
//! collection, policy signatures, seeding with drift reporting, precedence
//! resolution and the per-session capability cache.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services and storage adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

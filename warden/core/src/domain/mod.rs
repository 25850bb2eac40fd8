// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and persistence contracts of the authorization core.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Capabilities, roles, signatures, precedence and session snapshots

pub mod capability;
pub mod config;
pub mod diagnostic;
pub mod events;
pub mod policy_state;
pub mod precedence;
pub mod repository;
pub mod role;
pub mod session;
pub mod signature;

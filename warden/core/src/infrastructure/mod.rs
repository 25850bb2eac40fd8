// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod event_bus;
pub mod plugin_manifest;
pub mod policy_state_file;
pub mod repositories;

pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use policy_state_file::JsonFilePolicyStateStore;

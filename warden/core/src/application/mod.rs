// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod collector;
pub mod repository_factory;
pub mod resolver;
pub mod seeder;
pub mod session_cache;

pub use collector::{CapabilityCollector, CollectedPolicy};
pub use repository_factory::{create_repositories, Repositories};
pub use resolver::{CapabilityResolver, PrecedenceResolver, ResolveError, ResolvedAuthorization};
pub use seeder::{PolicySeeder, SeedOptions, SeedReport, SkippedAssignment};
pub use session_cache::{CacheOutcome, CachedSnapshot, SessionCacheError, SessionCapabilityCache};

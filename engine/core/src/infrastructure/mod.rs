// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: concrete repository implementations.

pub mod repositories;

pub use repositories::InMemoryPatternRepository;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: pure clinical types and their invariants.

pub mod document;
pub mod fact;
pub mod feedback;
pub mod knowledge;
pub mod repository;
pub mod timeline;
pub mod uncertainty;

pub use document::*;
pub use fact::*;
pub use feedback::*;
pub use knowledge::*;
pub use repository::*;
pub use timeline::*;
pub use uncertainty::*;

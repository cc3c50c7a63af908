//! Shared test utilities for deckforge integration tests.
//!
//! This module provides:
//! - `FakeStages`, scriptable resolve/transform/synthesize collaborators
//! - `StagesBuilder` for configuring gates and failures per URL
//! - Polling helpers that wait on scheduler state with a timeout

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;

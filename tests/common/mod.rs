//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `stubs`: a scriptable [`FrameSource`](replay_prefetch::FrameSource) that synthesizes
//!   frames, records every request, and can fail or delay chosen chunks
//! - `test_utils`: record factories, tracing setup and request-sequence checks
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::stubs::StubSource;
//! use common::test_utils::{assert_chained, numbered};
//! ```

pub mod stubs;
pub mod test_utils;

// Re-export commonly used items for convenience.
#[allow(unused_imports)]
pub use stubs::StubSource;
#[allow(unused_imports)]
pub use test_utils::{assert_chained, init_tracing, numbered, vehicle_at};

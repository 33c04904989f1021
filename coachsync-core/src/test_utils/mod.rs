//! Test utilities shared by unit and integration tests
//!
//! Action fixtures and async polling helpers.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;

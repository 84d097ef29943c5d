//! Common test utilities for provisio-features
//!
//! This module provides shared test infrastructure including:
//! - Feature builders for creating catalog fixtures
//! - A recording artifact loader with injectable failures
//! - State stores that fail on demand

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

//! Command implementations

pub mod boot;
pub mod feature;
pub mod repo;
pub mod status;

mod common;

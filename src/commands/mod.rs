//! CLI command implementations.

pub mod cache;
pub mod generate;
pub mod sources;

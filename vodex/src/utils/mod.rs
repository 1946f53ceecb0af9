//! Shared utilities.

pub mod filename;
pub mod fs;

//! Shared utilities.
//!
//! Checksum verification, atomic filesystem helpers and test helpers.

pub mod fs;
pub mod hash;

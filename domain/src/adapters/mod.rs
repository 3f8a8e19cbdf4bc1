//! Test-only adapters that live inside the domain crate for convenience.
//!
//! These are intended purely for unit testing. Real adapters (SQLite, the
//! settings file) live in separate crates.

pub mod memory;

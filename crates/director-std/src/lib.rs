//! Thin abstractions over `std` used by the director crates.
//!
//! | Concern | Trait | Production | Test |
//! |---------|-------|------------|------|
//! | Env vars | [`ReadEnv`] | [`SystemEnv`] | `InMemoryEnv`* |
//!
//! *Available with `#[cfg(test)]` or the `"test-support"` feature.

pub mod env;

pub use env::{ReadEnv, SystemEnv};

#[cfg(any(test, feature = "test-support"))]
pub use env::InMemoryEnv;

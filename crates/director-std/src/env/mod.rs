//! Environment variable access behind a trait so configuration loaders can be
//! exercised without touching the process environment.

#[cfg(any(test, feature = "test-support"))]
mod in_memory;
mod system;

use std::env::VarError;

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryEnv;
pub use system::SystemEnv;

pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;

    /// Like [`ReadEnv::var`], but treats unset, non-unicode and blank values alike.
    fn non_empty_var(&self, key: &str) -> Option<String> {
        self.var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl<E: ReadEnv + ?Sized> ReadEnv for &E {
    fn var(&self, key: &str) -> Result<String, VarError> {
        (**self).var(key)
    }
}

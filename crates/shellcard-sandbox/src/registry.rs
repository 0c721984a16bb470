//! Driver registry.
//!
//! An owned object assembled once at process start and shared read-only
//! afterwards; nothing registers itself behind the caller's back, so tests
//! can build isolated registries with whatever drivers they need.

use std::collections::HashMap;
use std::sync::Arc;

use shellcard_core::error::{ShellcardError, ShellcardResult};
use shellcard_core::traits::Sandbox;

use crate::podman::PodmanDriver;

/// Creates a fresh driver instance on lookup.
pub type DriverFactory = Box<dyn Fn() -> ShellcardResult<Arc<dyn Sandbox>> + Send + Sync>;

/// Registry of available sandbox drivers.
pub struct DriverRegistry {
    drivers: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Add a driver factory under a name.
    ///
    /// Duplicate registration is a programming error and panics.
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) {
        let name = name.into();
        if self.drivers.contains_key(&name) {
            panic!("sandbox driver {name:?} registered twice");
        }
        self.drivers.insert(name, factory);
    }

    /// Instantiate the named driver.
    pub fn get(&self, name: &str) -> ShellcardResult<Arc<dyn Sandbox>> {
        let factory = self.drivers.get(name).ok_or_else(|| {
            ShellcardError::Configuration(format!(
                "sandbox driver {name:?} not found (available: {})",
                self.available().join(", ")
            ))
        })?;
        factory()
    }

    /// Names of all registered drivers, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry with all built-in drivers, assembled at process start.
pub fn builtin_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(
        "podman",
        Box::new(|| Ok(Arc::new(PodmanDriver::new()?) as Arc<dyn Sandbox>)),
    );
    registry
}

//! shellcard-sandbox - Container execution backends for shellcard.
//!
//! Provides the driver registry and the reference Podman backend. The
//! `Sandbox` trait itself lives in `shellcard-core`; this crate supplies
//! implementations and the explicit bootstrap that assembles the registry at
//! process start.

mod podman;
mod registry;

pub use podman::PodmanDriver;
pub use registry::{builtin_registry, DriverFactory, DriverRegistry};

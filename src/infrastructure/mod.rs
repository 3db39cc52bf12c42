//! Infrastructure layer - adapters for targets and the runtime.
//!
//! This layer provides adapters for:
//! - Namespaces (shared containers of substitutable values)
//! - Locator resolution (module registry)
//! - Attribute and mapping substitutions
//! - Spec classification for child doubles
//! - Environment settings and the timeout helper

pub mod config;
pub mod mapping;
pub mod namespace;
pub mod patch;
pub mod resolver;
pub mod spec;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a manual step driver and a log capture
/// layer.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// async-patch = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::error::{ConfigurationError, PatchError};
use crate::domain::scope::Scope;
use std::fmt::Debug;

/// Port for a single reversible substitution.
///
/// Groups and the activator only talk to substitutions through this trait,
/// so plain attribute substitutions and mapping substitutions over any value
/// type can be stacked together.
pub trait Patch: Send + Debug {
    /// Scope deciding when the activator makes this substitution visible.
    fn scope(&self) -> Scope;

    /// Check if the substitution is currently installed.
    fn is_active(&self) -> bool;

    /// Install the replacement.
    ///
    /// # Errors
    /// Returns `StateError::AlreadyActive` if already installed, or a
    /// configuration error if the target cannot be resolved.
    fn activate(&mut self) -> Result<(), PatchError>;

    /// Restore what `activate` replaced. A no-op when inactive.
    fn deactivate(&mut self) -> Result<(), PatchError>;

    /// Create an inactive substitution with the same target, replacement and
    /// scope.
    fn copy(&self) -> Box<dyn Patch>;

    /// Human-readable target description for logs and errors.
    fn target(&self) -> String;
}

/// Port for resolving dotted target locators.
///
/// Infrastructure provides `ModuleRegistry`.
pub trait Resolver: Send + Sync {
    /// Container type the locators resolve into.
    type Container;

    /// Split `locator` into a container and the attribute name inside it.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidLocator` for malformed locators and
    /// `ConfigurationError::UnknownContainer` when nothing is registered at the
    /// container path.
    fn resolve(&self, locator: &str) -> Result<(Self::Container, String), ConfigurationError>;

    /// Look up a container by its full path.
    ///
    /// Used by batch substitutions that replace several names on one target.
    fn container(&self, path: &str) -> Result<Self::Container, ConfigurationError>;
}

/// Port for classifying attributes of a template object.
///
/// Used when a double generates child doubles: a deferred-result-shaped
/// attribute produces a deferred-result double.
pub trait SpecClassifier: Send + Sync + Debug {
    /// Check if the real attribute returns a deferred result when called.
    fn is_deferred(&self, attribute: &str) -> bool;

    /// Check if the template has the attribute at all.
    fn has_attribute(&self, _attribute: &str) -> bool {
        true
    }
}

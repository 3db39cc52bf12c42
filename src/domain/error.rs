//! Error taxonomy.
//!
//! - [`ConfigurationError`]: a substitution or double was set up incorrectly
//! - [`StateError`]: activation bookkeeping was violated
//! - [`PatchError`]: either of the above, as returned by patch operations
//! - [`Failure`]: the failed outcome of calling a test double
//! - [`AssertionError`]: a verification query did not hold

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A substitution target or batch was configured incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The locator is not a dotted `container.name` path.
    #[error("invalid target locator `{0}`, expected a dotted path such as `package.module.name`")]
    InvalidLocator(String),
    /// No container is registered under the given path.
    #[error("no container registered as `{0}`")]
    UnknownContainer(String),
    /// The target attribute does not exist and may not be created.
    #[error("`{container}` has no attribute `{name}`")]
    MissingAttribute {
        /// Name of the container that was searched
        container: String,
        /// Attribute that was not found
        name: String,
    },
    /// A batch substitution was created without any name/value pairs.
    #[error("a batch substitution needs at least one name/value pair")]
    EmptyBatch,
}

/// Activation bookkeeping was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The substitution is already active.
    #[error("substitution of `{0}` is already active")]
    AlreadyActive(String),
    /// An active substitution was not registered on its container.
    #[error("active substitution of `{0}` is missing from the sibling registry")]
    UnknownSibling(String),
}

/// Error returned by substitution and activation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Invalid activation state.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Failed outcome of a test double call.
///
/// `Raised` keeps the error behind an `Arc` so a configured error instance is
/// handed out as the very same object on every resolution.
pub enum Failure<E> {
    /// The configured outcome raised this error.
    Raised(Arc<E>),
    /// A finite outcome sequence ran out of elements.
    Exhausted,
    /// The double was called but its kind is not callable.
    NotCallable(String),
    /// The double does not implement the container protocol.
    Unsupported(String),
    /// A synchronous double resolved to a deferred result.
    Deferred(String),
}

impl<E> Failure<E> {
    /// Wrap a fresh error.
    pub fn raised(error: E) -> Self {
        Failure::Raised(Arc::new(error))
    }

    /// Check if this failure signals an exhausted outcome sequence.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Failure::Exhausted)
    }

    /// Get the raised error, if any.
    pub fn error(&self) -> Option<&Arc<E>> {
        match self {
            Failure::Raised(error) => Some(error),
            _ => None,
        }
    }
}

impl<E> Clone for Failure<E> {
    fn clone(&self) -> Self {
        match self {
            Failure::Raised(error) => Failure::Raised(Arc::clone(error)),
            Failure::Exhausted => Failure::Exhausted,
            Failure::NotCallable(name) => Failure::NotCallable(name.clone()),
            Failure::Unsupported(name) => Failure::Unsupported(name.clone()),
            Failure::Deferred(name) => Failure::Deferred(name.clone()),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Raised(error) => f.debug_tuple("Raised").field(error).finish(),
            Failure::Exhausted => f.write_str("Exhausted"),
            Failure::NotCallable(name) => f.debug_tuple("NotCallable").field(name).finish(),
            Failure::Unsupported(name) => f.debug_tuple("Unsupported").field(name).finish(),
            Failure::Deferred(name) => f.debug_tuple("Deferred").field(name).finish(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Raised(error) => write!(f, "{}", error),
            Failure::Exhausted => write!(f, "canned outcome sequence is exhausted"),
            Failure::NotCallable(name) => write!(f, "`{}` is not callable", name),
            Failure::Unsupported(name) => {
                write!(f, "`{}` does not support the container protocol", name)
            }
            Failure::Deferred(name) => write!(
                f,
                "`{}` resolved to a deferred result, use a deferred-result double",
                name
            ),
        }
    }
}

impl<E> std::error::Error for Failure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Failure::Raised(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

/// A verification query on a test double did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AssertionError {
    message: String,
}

impl AssertionError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Get the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

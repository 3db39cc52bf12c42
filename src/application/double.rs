//! Shared state and construction of test doubles.
//!
//! Every double is a handle to a [`MockCore`]: its name, its variant, the
//! canned outcome, the ledger it records into, and the child doubles it has
//! generated so far. [`MockBuilder`] validates a configuration and produces
//! either handle type.

use crate::application::ledger::CallLedger;
use crate::application::mock::{AsyncMock, Mock};
use crate::application::ports::SpecClassifier;
use crate::domain::error::{ConfigurationError, Failure};
use crate::domain::kind::DoubleKind;
use crate::domain::outcome::{Outcome, Resolution, Step};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Error returned when building a double with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A callable double was configured without an outcome.
    #[error("callable double `{0}` needs an outcome")]
    MissingOutcome(String),
    /// A non-callable double was given an outcome it could never produce.
    #[error("non-callable double `{0}` cannot have an outcome")]
    OutcomeOnNonCallable(String),
    /// Container keys were given to a double without the container protocol.
    #[error("double `{0}` does not implement the container protocol")]
    ContainerProtocolUnsupported(String),
    /// The requested handle type does not match the configured variant.
    #[error("double `{name}` is configured as {found:?}, expected {expected}")]
    KindMismatch {
        /// Name of the double
        name: String,
        /// Variant the handle type needs
        expected: &'static str,
        /// Variant that was configured
        found: DoubleKind,
    },
}

/// State shared by every handle of one double.
pub(crate) struct MockCore<A, T, E> {
    name: String,
    kind: DoubleKind,
    outcome: Mutex<Option<Outcome<A, T, E>>>,
    ledger: CallLedger<A, T, E>,
    spec: Option<Arc<dyn SpecClassifier>>,
    container_keys: Vec<String>,
    children: Mutex<BTreeMap<String, AnyMock<A, T, E>>>,
}

impl<A, T, E> MockCore<A, T, E> {
    fn with_outcome(name: String, kind: DoubleKind, outcome: Outcome<A, T, E>) -> Self {
        Self {
            name,
            kind,
            outcome: Mutex::new(Some(outcome)),
            ledger: CallLedger::new(),
            spec: None,
            container_keys: Vec::new(),
            children: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn callable(name: String, outcome: Outcome<A, T, E>) -> Self {
        Self::with_outcome(name, DoubleKind::Callable, outcome)
    }

    pub(crate) fn deferred(name: String, outcome: Outcome<A, T, E>) -> Self {
        Self::with_outcome(name, DoubleKind::DeferredResult, outcome)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> DoubleKind {
        self.kind
    }

    pub(crate) fn ledger(&self) -> &CallLedger<A, T, E> {
        &self.ledger
    }

    pub(crate) fn container_keys(&self) -> &[String] {
        &self.container_keys
    }

    fn lock_outcome(&self) -> MutexGuard<'_, Option<Outcome<A, T, E>>> {
        self.outcome
            .lock()
            .expect("double outcome mutex poisoned - a thread panicked while holding the lock")
    }

    fn lock_children(&self) -> MutexGuard<'_, BTreeMap<String, AnyMock<A, T, E>>> {
        self.children
            .lock()
            .expect("double children mutex poisoned - a thread panicked while holding the lock")
    }

    pub(crate) fn set_outcome(&self, outcome: Outcome<A, T, E>) {
        *self.lock_outcome() = Some(outcome);
    }

    /// Resolve the outcome for one call.
    ///
    /// Functions run after the outcome lock is released, so they may call
    /// back into the double.
    pub(crate) fn resolve(&self, args: &A) -> Resolution<T, E>
    where
        T: Clone,
    {
        let step = match self.lock_outcome().as_mut() {
            Some(outcome) => outcome.step(),
            None => return Resolution::Ready(Err(Failure::NotCallable(self.name.clone()))),
        };
        match step {
            Step::Resolved(resolution) => resolution,
            Step::Call(function) => function(args).resolve(args),
        }
    }

    /// Get or generate the child double for `attribute`.
    pub(crate) fn child(&self, attribute: &str) -> Result<AnyMock<A, T, E>, ConfigurationError>
    where
        T: Default,
    {
        if let Some(spec) = &self.spec {
            if !spec.has_attribute(attribute) {
                return Err(ConfigurationError::MissingAttribute {
                    container: self.name.clone(),
                    name: attribute.to_string(),
                });
            }
        }

        let mut children = self.lock_children();
        if let Some(child) = children.get(attribute) {
            return Ok(child.clone());
        }

        let deferred = self
            .spec
            .as_ref()
            .map_or(false, |spec| spec.is_deferred(attribute));
        let kind = self.kind.child_kind(deferred);
        let name = format!("{}.{}", self.name, attribute);
        debug!(double = %name, ?kind, "generated child double");

        let child = AnyMock::from_core(Arc::new(MockCore::with_outcome(
            name,
            kind,
            Outcome::Value(T::default()),
        )));
        children.insert(attribute.to_string(), child.clone());
        Ok(child)
    }

    /// Names of the children generated so far.
    #[cfg(test)]
    pub(crate) fn child_names(&self) -> Vec<String> {
        self.lock_children().keys().cloned().collect()
    }

    /// Clear this double's records and those of every generated child.
    pub(crate) fn reset(&self) {
        self.ledger.reset();
        for child in self.lock_children().values() {
            child.reset_mock();
        }
    }
}

impl<A, T, E> fmt::Debug for MockCore<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCore")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ledger", &self.ledger)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// A double of any variant.
///
/// Child doubles are returned as `AnyMock` because their variant depends on
/// the parent and on its attribute spec.
pub enum AnyMock<A, T, E> {
    /// Produces its outcome at call time.
    Sync(Mock<A, T, E>),
    /// Returns a deferred result.
    Deferred(AsyncMock<A, T, E>),
}

impl<A, T, E> AnyMock<A, T, E> {
    pub(crate) fn from_core(core: Arc<MockCore<A, T, E>>) -> Self {
        if core.kind().is_deferred() {
            AnyMock::Deferred(AsyncMock::from_core(core))
        } else {
            AnyMock::Sync(Mock::from_core(core))
        }
    }

    fn core(&self) -> &MockCore<A, T, E> {
        match self {
            AnyMock::Sync(mock) => mock.core(),
            AnyMock::Deferred(mock) => mock.core(),
        }
    }

    /// Name of the double.
    pub fn name(&self) -> &str {
        self.core().name()
    }

    /// Variant of the double.
    pub fn kind(&self) -> DoubleKind {
        self.core().kind()
    }

    /// Ledger the double records into.
    pub fn ledger(&self) -> &CallLedger<A, T, E> {
        self.core().ledger()
    }

    /// Get the synchronous handle, if this is one.
    pub fn as_sync(&self) -> Option<&Mock<A, T, E>> {
        match self {
            AnyMock::Sync(mock) => Some(mock),
            AnyMock::Deferred(_) => None,
        }
    }

    /// Get the deferred-result handle, if this is one.
    pub fn as_deferred(&self) -> Option<&AsyncMock<A, T, E>> {
        match self {
            AnyMock::Sync(_) => None,
            AnyMock::Deferred(mock) => Some(mock),
        }
    }

    /// Clear the records of the double and its children.
    pub fn reset_mock(&self) {
        self.core().reset();
    }
}

impl<A, T, E> Clone for AnyMock<A, T, E> {
    fn clone(&self) -> Self {
        match self {
            AnyMock::Sync(mock) => AnyMock::Sync(mock.clone()),
            AnyMock::Deferred(mock) => AnyMock::Deferred(mock.clone()),
        }
    }
}

impl<A, T, E> fmt::Debug for AnyMock<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyMock::Sync(mock) => f.debug_tuple("Sync").field(mock).finish(),
            AnyMock::Deferred(mock) => f.debug_tuple("Deferred").field(mock).finish(),
        }
    }
}

/// Builder for test doubles.
///
/// # Example
/// ```
/// use async_patch::{AttributeSpec, DoubleKind, MockBuilder};
///
/// let client = MockBuilder::<String, u32, std::io::Error>::new("client")
///     .with_kind(DoubleKind::NonCallable)
///     .with_spec(AttributeSpec::new().attribute("close").deferred_attribute("fetch"))
///     .build()
///     .unwrap();
///
/// let fetch = client.as_sync().unwrap().child("fetch").unwrap();
/// assert_eq!(fetch.kind(), DoubleKind::DeferredResult);
/// ```
pub struct MockBuilder<A, T, E> {
    name: String,
    kind: Option<DoubleKind>,
    outcome: Option<Outcome<A, T, E>>,
    ledger: Option<CallLedger<A, T, E>>,
    spec: Option<Arc<dyn SpecClassifier>>,
    container_keys: Option<Vec<String>>,
}

impl<A, T, E> MockBuilder<A, T, E> {
    /// Start configuring a double called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            outcome: None,
            ledger: None,
            spec: None,
            container_keys: None,
        }
    }

    /// Set the variant.
    ///
    /// Defaults to `Callable` for [`build`](Self::build) and
    /// [`build_sync`](Self::build_sync), and to `DeferredResult` for
    /// [`build_async`](Self::build_async).
    pub fn with_kind(mut self, kind: DoubleKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the canned outcome.
    pub fn with_outcome(mut self, outcome: Outcome<A, T, E>) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Produce `value` on every call.
    pub fn returning(self, value: T) -> Self {
        self.with_outcome(Outcome::value(value))
    }

    /// Produce `T::default()` on every call.
    pub fn returning_default(self) -> Self
    where
        T: Default,
    {
        self.returning(T::default())
    }

    /// Fail every call with the same `error` instance.
    pub fn raising(self, error: E) -> Self {
        self.with_outcome(Outcome::raise(error))
    }

    /// Record into an existing ledger instead of a fresh one.
    pub fn with_ledger(mut self, ledger: CallLedger<A, T, E>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Describe the real object, used to generate child doubles.
    pub fn with_spec<S: SpecClassifier + 'static>(mut self, spec: S) -> Self {
        self.spec = Some(Arc::new(spec));
        self
    }

    /// Keys answered by the container protocol.
    pub fn with_container_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.container_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Build a double of the configured variant.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<AnyMock<A, T, E>, BuildError> {
        let core = self.into_core(DoubleKind::Callable)?;
        Ok(AnyMock::from_core(Arc::new(core)))
    }

    /// Build a synchronous double.
    ///
    /// # Errors
    /// Returns `BuildError::KindMismatch` if configured as `DeferredResult`.
    pub fn build_sync(self) -> Result<Mock<A, T, E>, BuildError> {
        let core = self.into_core(DoubleKind::Callable)?;
        if core.kind().is_deferred() {
            return Err(BuildError::KindMismatch {
                name: core.name,
                expected: "a synchronous variant",
                found: core.kind,
            });
        }
        Ok(Mock::from_core(Arc::new(core)))
    }

    /// Build a deferred-result double.
    ///
    /// # Errors
    /// Returns `BuildError::KindMismatch` if configured with another variant.
    pub fn build_async(self) -> Result<AsyncMock<A, T, E>, BuildError> {
        let core = self.into_core(DoubleKind::DeferredResult)?;
        if !core.kind().is_deferred() {
            return Err(BuildError::KindMismatch {
                name: core.name,
                expected: "DeferredResult",
                found: core.kind,
            });
        }
        Ok(AsyncMock::from_core(Arc::new(core)))
    }

    fn into_core(self, default_kind: DoubleKind) -> Result<MockCore<A, T, E>, BuildError> {
        let kind = self.kind.unwrap_or(default_kind);

        match (kind.is_callable(), self.outcome.is_some()) {
            (true, false) => return Err(BuildError::MissingOutcome(self.name)),
            (false, true) => return Err(BuildError::OutcomeOnNonCallable(self.name)),
            _ => {}
        }
        if self.container_keys.is_some() && !kind.supports_container_protocol() {
            return Err(BuildError::ContainerProtocolUnsupported(self.name));
        }

        Ok(MockCore {
            name: self.name,
            kind,
            outcome: Mutex::new(self.outcome),
            ledger: self.ledger.unwrap_or_default(),
            spec: self.spec,
            container_keys: self.container_keys.unwrap_or_default(),
            children: Mutex::new(BTreeMap::new()),
        })
    }
}

impl<A, T, E> fmt::Debug for MockBuilder<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_outcome", &self.outcome.is_some())
            .field("spec", &self.spec)
            .field("container_keys", &self.container_keys)
            .finish()
    }
}

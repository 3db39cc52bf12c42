//! Test double handles.
//!
//! - [`AsyncMock`]: calling records the invocation and returns a fresh
//!   [`MockCall`] future; the outcome is produced when that future is driven
//! - [`Mock`]: calling records and resolves immediately
//!
//! Handles are cheap to clone and clones share the same double, so a handle
//! can be installed as a substitution replacement while the test keeps
//! another one for assertions.

use crate::application::assertions::{History, Verb};
use crate::application::double::{AnyMock, MockBuilder, MockCore};
use crate::application::ledger::{CallLedger, Ticket};
use crate::domain::error::{AssertionError, ConfigurationError, Failure};
use crate::domain::kind::DoubleKind;
use crate::domain::outcome::{DeferredOutcome, Outcome, Resolution};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// A test double whose calls return deferred results.
///
/// # Example
/// ```
/// use async_patch::{AsyncMock, Outcome};
///
/// # futures::executor::block_on(async {
/// let fetch = AsyncMock::<&str, u32, std::io::Error>::new("fetch", Outcome::values([1, 2]));
///
/// let first = fetch.call("a");
/// let second = fetch.call("b");
/// assert_eq!(fetch.call_count(), 2);
/// assert_eq!(fetch.await_count(), 0);
///
/// // Resolution happens when driven, in driving order
/// assert_eq!(second.await.unwrap(), 1);
/// assert_eq!(first.await.unwrap(), 2);
///
/// fetch.assert_awaited_with(&"a").unwrap();
/// fetch.assert_has_awaits(&["b", "a"], false).unwrap();
/// # });
/// ```
pub struct AsyncMock<A, T, E> {
    core: Arc<MockCore<A, T, E>>,
}

impl<A, T, E> AsyncMock<A, T, E> {
    pub(crate) fn from_core(core: Arc<MockCore<A, T, E>>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &MockCore<A, T, E> {
        &self.core
    }

    /// Create a deferred-result double producing `outcome`.
    pub fn new(name: impl Into<String>, outcome: Outcome<A, T, E>) -> Self {
        Self::from_core(Arc::new(MockCore::deferred(name.into(), outcome)))
    }

    /// Create a deferred-result double producing `value` on every call.
    pub fn returning(name: impl Into<String>, value: T) -> Self {
        Self::new(name, Outcome::value(value))
    }

    /// Start configuring a double with [`MockBuilder`].
    pub fn builder(name: impl Into<String>) -> MockBuilder<A, T, E> {
        MockBuilder::new(name).with_kind(DoubleKind::DeferredResult)
    }

    /// Name of the double.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Variant of the double, always `DeferredResult`.
    pub fn kind(&self) -> DoubleKind {
        self.core.kind()
    }

    /// Ledger the double records into.
    pub fn ledger(&self) -> &CallLedger<A, T, E> {
        self.core.ledger()
    }

    /// Replace the outcome for calls resolved from now on.
    pub fn set_outcome(&self, outcome: Outcome<A, T, E>) {
        self.core.set_outcome(outcome);
    }

    /// Get or generate the child double for `attribute`.
    ///
    /// # Errors
    /// Returns `ConfigurationError::MissingAttribute` when a strict spec does
    /// not list the attribute.
    pub fn child(&self, attribute: &str) -> Result<AnyMock<A, T, E>, ConfigurationError>
    where
        T: Default,
    {
        self.core.child(attribute)
    }

    /// Clear the ledger records of the double and its children.
    pub fn reset_mock(&self) {
        self.core.reset();
    }

    /// Call the double.
    ///
    /// The invocation is recorded now. The returned future resolves the
    /// outcome on its first poll and records the completion when it finishes;
    /// dropping it before then records nothing more.
    pub fn call(&self, args: A) -> MockCall<A, T, E>
    where
        A: Clone,
    {
        let ticket = self.core.ledger().record_invocation(args.clone());
        MockCall {
            core: Arc::clone(&self.core),
            ticket,
            args,
            state: CallState::Unresolved,
        }
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.core.ledger().invocation_count()
    }

    /// Number of calls whose future completed.
    pub fn await_count(&self) -> usize {
        self.core.ledger().completion_count()
    }

    /// Arguments of the most recent completion.
    pub fn await_args(&self) -> Option<A>
    where
        A: Clone,
    {
        self.core.ledger().completed_args().pop()
    }

    /// Arguments of every completion, in completion order.
    pub fn await_args_list(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.core.ledger().completed_args()
    }

    fn awaits(&self) -> History<'_, A>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        History::new(self.name(), Verb::Await, self.core.ledger().completed_args())
    }

    fn calls(&self) -> History<'_, A>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        History::new(self.name(), Verb::Call, self.core.ledger().invoked_args())
    }

    /// Assert that at least one call completed.
    pub fn assert_awaited(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().at_least_once()
    }

    /// Assert that exactly one call completed.
    pub fn assert_awaited_once(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().exactly_once()
    }

    /// Assert that no call completed.
    pub fn assert_not_awaited(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().never()
    }

    /// Assert that the most recent completion had these arguments.
    pub fn assert_awaited_with(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().last_with(args)
    }

    /// Assert that some completion had these arguments.
    pub fn assert_any_await(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().any_with(args)
    }

    /// Assert that exactly one call completed, with these arguments.
    pub fn assert_awaited_once_with(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().once_with(args)
    }

    /// Assert that the completions include `expected`.
    ///
    /// With `any_order == false` the arguments must appear in this relative
    /// order, not necessarily adjacent; otherwise in any order.
    pub fn assert_has_awaits(&self, expected: &[A], any_order: bool) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.awaits().has(expected, any_order)
    }

    /// Assert that the double was called at least once.
    pub fn assert_called(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().at_least_once()
    }

    /// Assert that the double was never called.
    pub fn assert_not_called(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().never()
    }
}

impl<A, T, E> Clone for AsyncMock<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A, T, E> fmt::Debug for AsyncMock<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncMock").field(&self.core).finish()
    }
}

enum CallState<T, E> {
    Unresolved,
    Forwarding(DeferredOutcome<T, E>),
    Done,
}

/// Future returned by [`AsyncMock::call`].
#[must_use = "futures do nothing unless polled"]
pub struct MockCall<A, T, E> {
    core: Arc<MockCore<A, T, E>>,
    ticket: Ticket,
    args: A,
    state: CallState<T, E>,
}

impl<A, T, E> MockCall<A, T, E> {
    /// Invocation index of this call.
    pub fn index(&self) -> usize {
        self.ticket.index()
    }

    fn finish(&mut self, result: Result<T, Failure<E>>) -> Result<T, Failure<E>>
    where
        A: Clone,
        T: Clone,
    {
        debug!(
            double = %self.core.name(),
            index = self.ticket.index(),
            success = result.is_ok(),
            "deferred call completed"
        );
        self.core.ledger().record_completion(self.ticket, result.clone());
        result
    }
}

// `args` is never pinned
impl<A, T, E> Unpin for MockCall<A, T, E> {}

impl<A: Clone, T: Clone, E> Future for MockCall<A, T, E> {
    type Output = Result<T, Failure<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, CallState::Done) {
                CallState::Unresolved => match this.core.resolve(&this.args) {
                    Resolution::Ready(result) => return Poll::Ready(this.finish(result)),
                    Resolution::Forward(deferred) => {
                        this.state = CallState::Forwarding(deferred);
                    }
                },
                CallState::Forwarding(mut deferred) => match Pin::new(&mut deferred).poll(cx) {
                    Poll::Ready(result) => return Poll::Ready(this.finish(result)),
                    Poll::Pending => {
                        this.state = CallState::Forwarding(deferred);
                        return Poll::Pending;
                    }
                },
                CallState::Done => panic!("`MockCall` polled after completion"),
            }
        }
    }
}

impl<A: fmt::Debug, T, E> fmt::Debug for MockCall<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            CallState::Unresolved => "unresolved",
            CallState::Forwarding(_) => "forwarding",
            CallState::Done => "done",
        };
        f.debug_struct("MockCall")
            .field("double", &self.core.name())
            .field("index", &self.ticket.index())
            .field("args", &self.args)
            .field("state", &state)
            .finish()
    }
}

/// A synchronous test double.
///
/// Variants: `NonCallable` only holds children, `Callable` resolves at call
/// time, `CallableWithContainerProtocol` additionally answers [`len`] and
/// [`contains`].
///
/// [`len`]: Mock::len
/// [`contains`]: Mock::contains
pub struct Mock<A, T, E> {
    core: Arc<MockCore<A, T, E>>,
}

impl<A, T, E> Mock<A, T, E> {
    pub(crate) fn from_core(core: Arc<MockCore<A, T, E>>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &MockCore<A, T, E> {
        &self.core
    }

    /// Create a callable double producing `outcome`.
    pub fn new(name: impl Into<String>, outcome: Outcome<A, T, E>) -> Self {
        Self::from_core(Arc::new(MockCore::callable(name.into(), outcome)))
    }

    /// Create a callable double producing `value` on every call.
    pub fn returning(name: impl Into<String>, value: T) -> Self {
        Self::new(name, Outcome::value(value))
    }

    /// Start configuring a double with [`MockBuilder`].
    pub fn builder(name: impl Into<String>) -> MockBuilder<A, T, E> {
        MockBuilder::new(name)
    }

    /// Name of the double.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Variant of the double.
    pub fn kind(&self) -> DoubleKind {
        self.core.kind()
    }

    /// Ledger the double records into.
    pub fn ledger(&self) -> &CallLedger<A, T, E> {
        self.core.ledger()
    }

    /// Replace the outcome for later calls.
    pub fn set_outcome(&self, outcome: Outcome<A, T, E>) {
        self.core.set_outcome(outcome);
    }

    /// Get or generate the child double for `attribute`.
    ///
    /// # Errors
    /// Returns `ConfigurationError::MissingAttribute` when a strict spec does
    /// not list the attribute.
    pub fn child(&self, attribute: &str) -> Result<AnyMock<A, T, E>, ConfigurationError>
    where
        T: Default,
    {
        self.core.child(attribute)
    }

    /// Clear the ledger records of the double and its children.
    pub fn reset_mock(&self) {
        self.core.reset();
    }

    /// Call the double and resolve its outcome now.
    ///
    /// # Errors
    /// - `Failure::NotCallable` for `NonCallable` doubles (nothing recorded)
    /// - `Failure::Deferred` if the outcome resolves to a deferred result
    /// - the configured failure otherwise
    pub fn call(&self, args: A) -> Result<T, Failure<E>>
    where
        A: Clone,
        T: Clone,
    {
        if !self.kind().is_callable() {
            return Err(Failure::NotCallable(self.name().to_string()));
        }

        let ticket = self.core.ledger().record_invocation(args.clone());
        let result = match self.core.resolve(&args) {
            Resolution::Ready(result) => result,
            Resolution::Forward(_) => Err(Failure::Deferred(self.name().to_string())),
        };
        self.core.ledger().record_completion(ticket, result.clone());
        result
    }

    /// Number of container keys.
    ///
    /// # Errors
    /// Returns `Failure::Unsupported` without the container protocol.
    pub fn len(&self) -> Result<usize, Failure<E>> {
        self.container().map(<[String]>::len)
    }

    /// Check if the container keys are empty.
    ///
    /// # Errors
    /// Returns `Failure::Unsupported` without the container protocol.
    pub fn is_empty(&self) -> Result<bool, Failure<E>> {
        self.container().map(<[String]>::is_empty)
    }

    /// Check if `key` is one of the container keys.
    ///
    /// # Errors
    /// Returns `Failure::Unsupported` without the container protocol.
    pub fn contains(&self, key: &str) -> Result<bool, Failure<E>> {
        self.container()
            .map(|keys| keys.iter().any(|candidate| candidate == key))
    }

    fn container(&self) -> Result<&[String], Failure<E>> {
        if !self.kind().supports_container_protocol() {
            return Err(Failure::Unsupported(self.name().to_string()));
        }
        Ok(self.core.container_keys())
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.core.ledger().invocation_count()
    }

    /// Arguments of the most recent call.
    pub fn call_args(&self) -> Option<A>
    where
        A: Clone,
    {
        self.core.ledger().invoked_args().pop()
    }

    /// Arguments of every call, in call order.
    pub fn call_args_list(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.core.ledger().invoked_args()
    }

    fn calls(&self) -> History<'_, A>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        History::new(self.name(), Verb::Call, self.core.ledger().invoked_args())
    }

    /// Assert that the double was called at least once.
    pub fn assert_called(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().at_least_once()
    }

    /// Assert that the double was called exactly once.
    pub fn assert_called_once(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().exactly_once()
    }

    /// Assert that the double was never called.
    pub fn assert_not_called(&self) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().never()
    }

    /// Assert that the most recent call had these arguments.
    pub fn assert_called_with(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().last_with(args)
    }

    /// Assert that some call had these arguments.
    pub fn assert_any_call(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().any_with(args)
    }

    /// Assert that exactly one call was made, with these arguments.
    pub fn assert_called_once_with(&self, args: &A) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().once_with(args)
    }

    /// Assert that the calls include `expected`, in relative order unless
    /// `any_order` is set.
    pub fn assert_has_calls(&self, expected: &[A], any_order: bool) -> Result<(), AssertionError>
    where
        A: Clone + PartialEq + fmt::Debug,
    {
        self.calls().has(expected, any_order)
    }
}

impl<A, T, E> Clone for Mock<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A, T, E> fmt::Debug for Mock<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mock").field(&self.core).finish()
    }
}

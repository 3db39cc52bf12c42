//! Canned outcomes for test doubles.
//!
//! An [`Outcome`] describes what a double produces when one of its calls is
//! resolved. Resolution follows a fixed set of rules:
//!
//! 1. `Value` produces a clone of the value
//! 2. `Raise` fails with the same error instance every time, `RaiseWith`
//!    builds a fresh error per resolution
//! 3. `Sequence` resolves its next element and signals
//!    [`Failure::Exhausted`] once empty
//! 4. `Function` is called with the call arguments and its result is
//!    resolved again with these rules
//! 5. `Deferred` is forwarded as is, so the caller only awaits one layer

use crate::domain::error::Failure;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A deferred result that any number of calls can await.
pub type DeferredOutcome<T, E> = Shared<BoxFuture<'static, Result<T, Failure<E>>>>;

/// Function computing an outcome from the call arguments.
pub type OutcomeFn<A, T, E> = Arc<dyn Fn(&A) -> Outcome<A, T, E> + Send + Sync>;

/// Function building a fresh error.
pub type ErrorFactory<E> = Arc<dyn Fn() -> E + Send + Sync>;

/// What a test double produces when a call is resolved.
///
/// # Example
/// ```
/// use async_patch::{Outcome, Resolution};
///
/// let mut outcome: Outcome<(), &str, std::io::Error> = Outcome::values(["a", "b"]);
///
/// assert!(matches!(outcome.resolve(&()), Resolution::Ready(Ok("a"))));
/// assert!(matches!(outcome.resolve(&()), Resolution::Ready(Ok("b"))));
/// assert!(matches!(
///     outcome.resolve(&()),
///     Resolution::Ready(Err(failure)) if failure.is_exhausted()
/// ));
/// ```
pub enum Outcome<A, T, E> {
    /// Produce this value on every resolution.
    Value(T),
    /// Fail with this exact error instance on every resolution.
    Raise(Arc<E>),
    /// Fail with a freshly built error on every resolution.
    RaiseWith(ErrorFactory<E>),
    /// Resolve the next element; exhausted once empty.
    Sequence(VecDeque<Outcome<A, T, E>>),
    /// Compute the outcome from the call arguments.
    Function(OutcomeFn<A, T, E>),
    /// Forward to an already deferred result.
    Deferred(DeferredOutcome<T, E>),
}

/// Result of resolving an [`Outcome`] once.
pub enum Resolution<T, E> {
    /// The outcome is known now.
    Ready(Result<T, Failure<E>>),
    /// The outcome is produced by this deferred result.
    Forward(DeferredOutcome<T, E>),
}

/// A single resolution step that never runs user code.
pub(crate) enum Step<A, T, E> {
    Resolved(Resolution<T, E>),
    Call(OutcomeFn<A, T, E>),
}

impl<A, T, E> Outcome<A, T, E> {
    /// Produce `value` on every call.
    pub fn value(value: T) -> Self {
        Outcome::Value(value)
    }

    /// Fail with `error` on every call, always the same instance.
    pub fn raise(error: E) -> Self {
        Outcome::Raise(Arc::new(error))
    }

    /// Fail with a fresh error built by `factory` on every call.
    pub fn raise_with<F>(factory: F) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
    {
        Outcome::RaiseWith(Arc::new(factory))
    }

    /// Resolve the given outcomes in order, then signal exhaustion.
    pub fn sequence<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Outcome<A, T, E>>,
    {
        Outcome::Sequence(outcomes.into_iter().collect())
    }

    /// Produce the given values in order, then signal exhaustion.
    pub fn values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Outcome::Sequence(values.into_iter().map(Outcome::Value).collect())
    }

    /// Compute the outcome from the call arguments.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&A) -> Outcome<A, T, E> + Send + Sync + 'static,
    {
        Outcome::Function(Arc::new(f))
    }

    /// Forward calls to a deferred result.
    ///
    /// The future runs at most once; every call observes its output.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Failure<E>>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        Outcome::Deferred(future.boxed().shared())
    }

    pub(crate) fn step(&mut self) -> Step<A, T, E>
    where
        T: Clone,
    {
        match self {
            Outcome::Value(value) => Step::Resolved(Resolution::Ready(Ok(value.clone()))),
            Outcome::Raise(error) => {
                Step::Resolved(Resolution::Ready(Err(Failure::Raised(Arc::clone(error)))))
            }
            Outcome::RaiseWith(factory) => {
                Step::Resolved(Resolution::Ready(Err(Failure::raised(factory()))))
            }
            Outcome::Sequence(outcomes) => match outcomes.pop_front() {
                Some(mut next) => next.step(),
                None => Step::Resolved(Resolution::Ready(Err(Failure::Exhausted))),
            },
            Outcome::Function(f) => Step::Call(Arc::clone(f)),
            Outcome::Deferred(deferred) => Step::Resolved(Resolution::Forward(deferred.clone())),
        }
    }

    /// Resolve the outcome for one call.
    pub fn resolve(&mut self, args: &A) -> Resolution<T, E>
    where
        T: Clone,
    {
        match self.step() {
            Step::Resolved(resolution) => resolution,
            Step::Call(f) => f(args).resolve(args),
        }
    }
}

impl<A, T, E> Outcome<A, T, E>
where
    A: 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Resolve `first` on the first call and `then` on every later call.
    pub fn once(first: Outcome<A, T, E>, then: Outcome<A, T, E>) -> Self {
        let used = AtomicBool::new(false);
        Outcome::function(move |_| {
            if used.swap(true, Ordering::AcqRel) {
                then.clone()
            } else {
                first.clone()
            }
        })
    }
}

impl<A, T: Clone, E> Clone for Outcome<A, T, E> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Value(value) => Outcome::Value(value.clone()),
            Outcome::Raise(error) => Outcome::Raise(Arc::clone(error)),
            Outcome::RaiseWith(factory) => Outcome::RaiseWith(Arc::clone(factory)),
            Outcome::Sequence(outcomes) => Outcome::Sequence(outcomes.clone()),
            Outcome::Function(f) => Outcome::Function(Arc::clone(f)),
            Outcome::Deferred(deferred) => Outcome::Deferred(deferred.clone()),
        }
    }
}

impl<A, T: fmt::Debug, E: fmt::Debug> fmt::Debug for Outcome<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Raise(error) => f.debug_tuple("Raise").field(error).finish(),
            Outcome::RaiseWith(_) => f.write_str("RaiseWith(..)"),
            Outcome::Sequence(outcomes) => f.debug_tuple("Sequence").field(outcomes).finish(),
            Outcome::Function(_) => f.write_str("Function(..)"),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

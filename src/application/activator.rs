//! Suspension-aware activation of substitution groups.
//!
//! [`Patched`] wraps a future or a stream and decides, poll by poll, which
//! substitutions of its [`PatchGroup`] are visible:
//!
//! - `Global` substitutions activate before the first poll and stay active
//!   until the computation terminates (completes, fails to activate, or is
//!   dropped before completion)
//! - `Limited` substitutions activate right before every poll and deactivate
//!   right after it, so they are hidden while the computation is suspended
//!
//! [`PatchedFn`] decorates a factory of computations. Every call copies the
//! group, so concurrent invocations never share activation state.
//!
//! # Interleaving hazard
//!
//! Substitutions are shared mutable state keyed by their target. When two
//! independently patched computations hold `Limited` substitutions of the same
//! target and the scheduler interleaves them, one computation's restore can
//! hide the target while the other still expects it. Nothing locks against
//! this; `MappingPatch` sibling tracking covers the container case only.
//!
//! Overlapping `Global` copies made by [`PatchedFn`] are safe to end in any
//! order: an earlier copy that ends first hands its original value to the
//! later one instead of writing it back.

use crate::application::group::PatchGroup;
use crate::application::ports::Patch;
use crate::domain::error::PatchError;
use crate::domain::scope::Scope;
use futures::Stream;
use pin_project::{pin_project, pinned_drop};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Lifecycle of a patched computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivatorState {
    /// Not polled yet; nothing is active.
    Uninitialized,
    /// Global substitutions are active, no step has run yet.
    GlobalActive,
    /// A step is running with limited substitutions active.
    Stepping,
    /// Between steps; only global substitutions are active.
    Suspended,
    /// Finished or abandoned; global substitutions were restored.
    Terminated,
}

/// A future or stream driven with a substitution group.
///
/// Implements `Future` when `T: Future`, with output
/// `Result<T::Output, PatchError>`, and `Stream` when `T: Stream`, with items
/// `Result<T::Item, PatchError>`. A stream also suspends after every yielded
/// item.
///
/// The computation's own output, including its own errors, is returned
/// unchanged. A `PatchError` is only returned when a substitution cannot be
/// activated or restored between steps.
#[pin_project(PinnedDrop, project = PatchedProj)]
pub struct Patched<T> {
    #[pin]
    inner: T,
    group: PatchGroup,
    state: ActivatorState,
}

impl<T> Patched<T> {
    /// Bind `group` to an already constructed computation.
    ///
    /// Global substitutions activate on the first poll.
    pub fn new(inner: T, group: PatchGroup) -> Self {
        Self {
            inner,
            group,
            state: ActivatorState::Uninitialized,
        }
    }

    /// Continue a computation whose global substitutions are already active.
    pub(crate) fn resumed(inner: T, group: PatchGroup) -> Self {
        Self {
            inner,
            group,
            state: ActivatorState::GlobalActive,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActivatorState {
        self.state
    }

    /// Substitution group bound to this computation.
    pub fn group(&self) -> &PatchGroup {
        &self.group
    }

    /// Get a reference to the wrapped computation.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Get a pinned mutable reference to the wrapped computation.
    pub fn get_pin_mut(self: Pin<&mut Self>) -> Pin<&mut T> {
        self.project().inner
    }
}

impl<T: Future> Future for Patched<T> {
    type Output = Result<T::Output, PatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        assert!(
            *this.state != ActivatorState::Terminated,
            "`Patched` future polled after completion"
        );
        drive(this, |inner| inner.poll(cx), |_| true)
    }
}

impl<T: Stream> Stream for Patched<T> {
    type Item = Result<T::Item, PatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.state == ActivatorState::Terminated {
            return Poll::Ready(None);
        }
        let exhausted = |item: &Option<T::Item>| item.is_none();
        match drive(this, |inner| inner.poll_next(cx), exhausted) {
            Poll::Ready(Ok(item)) => Poll::Ready(item.map(Ok)),
            Poll::Ready(Err(error)) => Poll::Ready(Some(Err(error))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl<T> PinnedDrop for Patched<T> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.state == ActivatorState::Terminated {
            return;
        }
        if *this.state != ActivatorState::Uninitialized {
            debug!(state = ?*this.state, "patched computation dropped before completion");
        }
        terminate(this.group, this.state);
    }
}

impl<T> fmt::Debug for Patched<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patched")
            .field("group", &self.group)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Runs one step: limited substitutions are active exactly while the inner
/// computation is polled.
fn drive<T, R>(
    this: PatchedProj<'_, T>,
    poll_inner: impl FnOnce(Pin<&mut T>) -> Poll<R>,
    is_final: fn(&R) -> bool,
) -> Poll<Result<R, PatchError>> {
    let PatchedProj {
        inner,
        group,
        state,
    } = this;

    if *state == ActivatorState::Uninitialized {
        if let Err(error) = group.activate_scope(Scope::Global) {
            *state = ActivatorState::Terminated;
            return Poll::Ready(Err(error));
        }
        *state = ActivatorState::GlobalActive;
    }

    if let Err(error) = group.activate_scope(Scope::Limited) {
        terminate(group, state);
        return Poll::Ready(Err(error));
    }
    *state = ActivatorState::Stepping;

    let guard = StepGuard::new(group);
    let polled = poll_inner(inner);
    let restored = guard.finish();

    match polled {
        Poll::Ready(output) if is_final(&output) => {
            if let Err(error) = restored {
                warn!(%error, "failed to restore a limited substitution after the final step");
            }
            terminate(group, state);
            Poll::Ready(Ok(output))
        }
        polled => {
            if let Err(error) = restored {
                terminate(group, state);
                return Poll::Ready(Err(error));
            }
            *state = ActivatorState::Suspended;
            polled.map(Ok)
        }
    }
}

/// Restores everything still active. Runs at most once per computation.
fn terminate(group: &mut PatchGroup, state: &mut ActivatorState) {
    if *state == ActivatorState::Terminated {
        return;
    }
    *state = ActivatorState::Terminated;
    group.unwind();
}

/// Deactivates limited substitutions even if the step panics.
struct StepGuard<'a> {
    group: &'a mut PatchGroup,
    armed: bool,
}

impl<'a> StepGuard<'a> {
    fn new(group: &'a mut PatchGroup) -> Self {
        Self { group, armed: true }
    }

    fn finish(mut self) -> Result<(), PatchError> {
        self.armed = false;
        self.group.deactivate_scope(Scope::Limited)
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(error) = self.group.deactivate_scope(Scope::Limited) {
                warn!(%error, "failed to restore a limited substitution after a panicking step");
            }
        }
    }
}

/// Unwinds a group whose construction did not complete.
struct InitGuard<'a> {
    group: &'a mut PatchGroup,
    armed: bool,
}

impl InitGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.group.unwind();
        }
    }
}

/// A factory of computations decorated with a substitution group.
///
/// # Example
/// ```
/// use async_patch::{Namespace, PatchGroup, Scope, Substitution};
///
/// let config = Namespace::new("app.config");
/// config.set("retries", 3);
///
/// let fetch = PatchGroup::new()
///     .with(Substitution::object(&config, "retries", 0).with_scope(Scope::Limited))
///     .decorate(|reader: Namespace<i32>| async move { reader.get("retries") });
///
/// let patched = fetch.call(config.clone()).unwrap();
/// let seen = futures::executor::block_on(patched).unwrap();
///
/// assert_eq!(seen, Some(0));
/// assert_eq!(config.get("retries"), Some(3));
/// ```
pub struct PatchedFn<G> {
    factory: G,
    group: PatchGroup,
}

impl<G> PatchedFn<G> {
    /// Decorate `factory` with `group`.
    pub fn new(factory: G, group: PatchGroup) -> Self {
        Self { factory, group }
    }

    /// Apply one more decorator on top of the existing ones.
    ///
    /// The new substitution activates first and deactivates last.
    pub fn patch<P: Patch + 'static>(self, patch: P) -> Self {
        self.patch_group(PatchGroup::new().with(patch))
    }

    /// Apply a whole group as an outer decorator.
    pub fn patch_group(mut self, outer: PatchGroup) -> Self {
        self.group.nest_inside(outer);
        self
    }

    /// The decorating group (never activated itself).
    pub fn group(&self) -> &PatchGroup {
        &self.group
    }

    /// Construct a patched computation.
    ///
    /// A copy of the group is fully activated while the factory runs; the
    /// computation starts with its global substitutions active.
    ///
    /// # Errors
    /// Returns the activation error after unwinding.
    pub fn call<A, F>(&self, args: A) -> Result<Patched<F>, PatchError>
    where
        G: Fn(A) -> F,
    {
        self.construct(|| Ok((self.factory)(args)))
    }

    /// Construct a patched computation with a fallible factory.
    ///
    /// # Errors
    /// Returns the factory's error unchanged, or an activation error
    /// converted into `E`, after every substitution has been restored.
    pub fn try_call<A, F, E>(&self, args: A) -> Result<Patched<F>, E>
    where
        G: Fn(A) -> Result<F, E>,
        E: From<PatchError>,
    {
        self.construct(|| (self.factory)(args))
    }

    fn construct<F, E>(&self, build: impl FnOnce() -> Result<F, E>) -> Result<Patched<F>, E>
    where
        E: From<PatchError>,
    {
        let mut group = self.group.copy();
        group.activate_scope(Scope::Global)?;

        let guard = InitGuard {
            group: &mut group,
            armed: true,
        };
        guard.group.activate_scope(Scope::Limited)?;
        let built = build();
        guard.group.deactivate_scope(Scope::Limited)?;
        let computation = built?;
        guard.disarm();

        Ok(Patched::resumed(computation, group))
    }
}

impl<G> fmt::Debug for PatchedFn<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchedFn")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Attach a substitution group to any future or stream.
pub trait WithPatches: Sized {
    /// Wrap `self` so `group` follows its suspensions.
    fn with_patches(self, group: PatchGroup) -> Patched<Self> {
        Patched::new(self, group)
    }
}

impl<T: Sized> WithPatches for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::group::tests::JournalPatch;
    use futures::task::noop_waker_ref;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Suspends `remaining` times, logging every poll.
    struct Steps {
        remaining: usize,
        journal: Journal,
    }

    impl Future for Steps {
        type Output = &'static str;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            self.journal.lock().unwrap().push("step".into());
            if self.remaining == 0 {
                return Poll::Ready("done");
            }
            self.remaining -= 1;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn group(journal: &Journal) -> PatchGroup {
        PatchGroup::new()
            .with(JournalPatch::new("g", Scope::Global, journal))
            .with(JournalPatch::new("l", Scope::Limited, journal))
    }

    #[test]
    fn test_limited_toggles_around_each_step() {
        let log = journal();
        let steps = Steps {
            remaining: 1,
            journal: Arc::clone(&log),
        };
        let mut patched = Box::pin(group(&log).wrap(steps));
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(patched.state(), ActivatorState::Uninitialized);
        assert!(patched.as_mut().poll(&mut cx).is_pending());
        assert_eq!(patched.state(), ActivatorState::Suspended);
        assert!(matches!(patched.as_mut().poll(&mut cx), Poll::Ready(Ok("done"))));
        assert_eq!(patched.state(), ActivatorState::Terminated);

        assert_eq!(
            entries(&log),
            ["+g", "+l", "step", "-l", "+l", "step", "-l", "-g"]
        );
    }

    #[test]
    fn test_abandoned_computation_restores_globals_once() {
        let log = journal();
        let steps = Steps {
            remaining: 5,
            journal: Arc::clone(&log),
        };
        let mut patched = Box::pin(group(&log).wrap(steps));
        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(patched.as_mut().poll(&mut cx).is_pending());
        drop(patched);

        assert_eq!(entries(&log), ["+g", "+l", "step", "-l", "-g"]);
    }

    #[test]
    fn test_never_polled_computation_touches_nothing() {
        let log = journal();
        let steps = Steps {
            remaining: 0,
            journal: Arc::clone(&log),
        };
        drop(group(&log).wrap(steps));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_activation_failure_terminates() {
        let log = journal();
        let group = PatchGroup::new()
            .with(JournalPatch::new("g", Scope::Global, &log))
            .with(JournalPatch::new("l", Scope::Limited, &log).failing());
        let steps = Steps {
            remaining: 0,
            journal: Arc::clone(&log),
        };
        let mut patched = Box::pin(group.wrap(steps));
        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(matches!(
            patched.as_mut().poll(&mut cx),
            Poll::Ready(Err(PatchError::Configuration(_)))
        ));
        assert_eq!(patched.state(), ActivatorState::Terminated);
        assert_eq!(entries(&log), ["+g", "-g"]);
    }

    #[test]
    fn test_panicking_step_still_restores() {
        struct Explodes;

        impl Future for Explodes {
            type Output = ();

            fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
                panic!("step failed");
            }
        }

        let log = journal();
        let mut patched = Box::pin(group(&log).wrap(Explodes));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut cx = Context::from_waker(noop_waker_ref());
            let _ = patched.as_mut().poll(&mut cx);
        }));
        assert!(result.is_err());
        assert_eq!(entries(&log), ["+g", "+l", "-l"]);

        drop(patched);
        assert_eq!(entries(&log), ["+g", "+l", "-l", "-g"]);
    }

    #[test]
    fn test_stream_suspends_after_each_item() {
        let log = journal();
        let stream = futures::stream::iter(vec![1, 2]);
        let mut patched = Box::pin(group(&log).wrap(stream));

        let items: Vec<i32> = futures::executor::block_on(async {
            let mut items = Vec::new();
            while let Some(item) = patched.next().await {
                items.push(item.unwrap());
            }
            items
        });

        assert_eq!(items, [1, 2]);
        assert_eq!(
            entries(&log),
            ["+g", "+l", "-l", "+l", "-l", "+l", "-l", "-g"]
        );
    }

    #[test]
    fn test_call_activates_around_construction() {
        let log = journal();
        let builds = Arc::clone(&log);
        let decorated = group(&log).decorate(move |remaining: usize| {
            builds.lock().unwrap().push("build".into());
            Steps {
                remaining,
                journal: Arc::clone(&builds),
            }
        });

        let patched = decorated.call(0).unwrap();
        assert_eq!(patched.state(), ActivatorState::GlobalActive);
        assert_eq!(futures::executor::block_on(patched).unwrap(), "done");

        assert_eq!(
            entries(&log),
            ["+g", "+l", "build", "-l", "+l", "step", "-l", "-g"]
        );
        assert!(!decorated.group().is_active());
    }

    #[test]
    fn test_failed_construction_unwinds() {
        #[derive(Debug, PartialEq)]
        enum BuildFailure {
            Arity,
            Patch(PatchError),
        }

        impl From<PatchError> for BuildFailure {
            fn from(error: PatchError) -> Self {
                BuildFailure::Patch(error)
            }
        }

        let log = journal();
        let decorated = group(&log).decorate(|arity: usize| {
            if arity == 2 {
                Ok(std::future::ready(()))
            } else {
                Err(BuildFailure::Arity)
            }
        });

        let err = decorated.try_call(3).unwrap_err();
        assert_eq!(err, BuildFailure::Arity);
        assert_eq!(entries(&log), ["+g", "+l", "-l", "-g"]);
    }

    #[test]
    fn test_outer_decorator_activates_first() {
        let log = journal();
        let decorated = PatchGroup::new()
            .with(JournalPatch::new("inner", Scope::Global, &log))
            .decorate(|_: ()| std::future::ready(()))
            .patch(JournalPatch::new("outer", Scope::Global, &log));

        futures::executor::block_on(decorated.call(()).unwrap()).unwrap();
        assert_eq!(entries(&log), ["+outer", "+inner", "-inner", "-outer"]);
    }

    #[test]
    fn test_invocations_use_independent_copies() {
        let log = journal();
        let decorated = group(&log).decorate(|_: ()| std::future::pending::<()>());

        let first = decorated.call(()).unwrap();
        // A second invocation would hit AlreadyActive if the group were shared
        let second = decorated.call(()).unwrap();
        assert!(first.group().is_active());
        assert!(second.group().is_active());

        drop(first);
        assert!(second.group().is_active());
    }
}

//! Shared record of test double calls and completions.
//!
//! A [`CallLedger`] is a cheap handle: clones share the same records, so
//! several doubles can write into one ledger and a test can keep a handle to
//! inspect it.

use crate::application::signal::CompletionSignal;
use crate::domain::call::{Completion, Invocation};
use crate::domain::error::Failure;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tracing::debug;

/// Identifies one recorded invocation.
///
/// The generation changes on every [`CallLedger::reset`], so calls that were
/// outstanding when the ledger was reset do not complete into the new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    generation: u64,
    index: usize,
}

impl Ticket {
    pub(crate) fn index(self) -> usize {
        self.index
    }
}

struct LedgerState<A, T, E> {
    generation: u64,
    invocations: Vec<Invocation<A>>,
    completions: Vec<Completion<A, T, E>>,
    signal: CompletionSignal,
}

/// Ordered record of invocations and completions.
///
/// Invocations are recorded when a double is called, completions when the
/// call's outcome is produced. For deferred-result doubles the two orders can
/// differ.
pub struct CallLedger<A, T, E> {
    state: Arc<Mutex<LedgerState<A, T, E>>>,
}

impl<A, T, E> CallLedger<A, T, E> {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                generation: 0,
                invocations: Vec::new(),
                completions: Vec::new(),
                signal: CompletionSignal::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState<A, T, E>> {
        self.state
            .lock()
            .expect("CallLedger mutex poisoned - a thread panicked while holding the lock")
    }

    /// Check if both handles share the same records.
    pub fn same_ledger(&self, other: &CallLedger<A, T, E>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Record a call and return its ticket.
    pub(crate) fn record_invocation(&self, args: A) -> Ticket {
        let mut state = self.lock();
        let index = state.invocations.len();
        state.invocations.push(Invocation { index, args });
        Ticket {
            generation: state.generation,
            index,
        }
    }

    /// Record the outcome of a call and wake the waiters it satisfies.
    pub(crate) fn record_completion(&self, ticket: Ticket, result: Result<T, Failure<E>>)
    where
        A: Clone,
    {
        let woken = {
            let mut state = self.lock();
            if ticket.generation != state.generation {
                debug!(index = ticket.index, "dropping completion of a call made before reset");
                return;
            }
            let Some(args) = state
                .invocations
                .get(ticket.index)
                .map(|invocation| invocation.args.clone())
            else {
                unreachable!(
                    "completion recorded for unknown invocation {} of the current generation",
                    ticket.index
                );
            };

            state.completions.push(Completion {
                index: ticket.index,
                args,
                result,
            });
            let completed = state.completions.len();
            state.signal.take_ready(completed)
        };

        // Wake outside the lock; a woken waiter may poll immediately
        for waker in woken {
            waker.wake();
        }
    }

    /// Number of recorded invocations.
    pub fn invocation_count(&self) -> usize {
        self.lock().invocations.len()
    }

    /// Number of recorded completions.
    pub fn completion_count(&self) -> usize {
        self.lock().completions.len()
    }

    /// Snapshot of the invocations in call order.
    pub fn invocations(&self) -> Vec<Invocation<A>>
    where
        A: Clone,
    {
        self.lock().invocations.clone()
    }

    /// Snapshot of the completions in completion order.
    pub fn completions(&self) -> Vec<Completion<A, T, E>>
    where
        A: Clone,
        T: Clone,
    {
        self.lock().completions.clone()
    }

    /// Arguments of every invocation, in call order.
    pub fn invoked_args(&self) -> Vec<A>
    where
        A: Clone,
    {
        let state = self.lock();
        state.invocations.iter().map(|i| i.args.clone()).collect()
    }

    /// Arguments of every completion, in completion order.
    pub fn completed_args(&self) -> Vec<A>
    where
        A: Clone,
    {
        let state = self.lock();
        state.completions.iter().map(|c| c.args.clone()).collect()
    }

    /// The most recent completion, if any.
    pub fn last_completion(&self) -> Option<Completion<A, T, E>>
    where
        A: Clone,
        T: Clone,
    {
        self.lock().completions.last().cloned()
    }

    /// Number of waiters currently suspended on this ledger.
    pub fn pending_waiters(&self) -> usize {
        self.lock().signal.pending()
    }

    /// Forget every invocation and completion.
    ///
    /// Pending waiters stay registered; their thresholds now count
    /// completions recorded after the reset. Calls outstanding at reset time
    /// complete without being recorded.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.invocations.clear();
        state.completions.clear();
    }

    /// Wait until `skip + 1` more calls complete.
    ///
    /// The threshold is fixed now: completions recorded between this call and
    /// the first poll of the returned future count towards it. The future
    /// resolves to the completion count it observed.
    ///
    /// # Example
    /// ```
    /// use async_patch::AsyncMock;
    ///
    /// # futures::executor::block_on(async {
    /// let fetch = AsyncMock::<u32, &str, std::io::Error>::returning("fetch", "body");
    /// let waiter = fetch.ledger().wait(0);
    ///
    /// fetch.call(1).await.unwrap();
    /// assert_eq!(waiter.await, 1);
    /// # });
    /// ```
    pub fn wait(&self, skip: usize) -> Wait<A, T, E> {
        let threshold = self.completion_count() + skip + 1;
        Wait {
            ledger: self.clone(),
            threshold,
            registration: None,
        }
    }
}

impl<A, T, E> Clone for CallLedger<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<A, T, E> Default for CallLedger<A, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, T, E> fmt::Debug for CallLedger<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CallLedger")
            .field("invocations", &state.invocations.len())
            .field("completions", &state.completions.len())
            .field("signal_bound", &state.signal.is_bound())
            .finish()
    }
}

/// Future returned by [`CallLedger::wait`].
///
/// Dropping a pending `Wait` only removes its own registration.
#[must_use = "futures do nothing unless polled"]
pub struct Wait<A, T, E> {
    ledger: CallLedger<A, T, E>,
    threshold: usize,
    registration: Option<u64>,
}

impl<A, T, E> Wait<A, T, E> {
    /// Completion count this waiter resumes at.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl<A, T, E> Future for Wait<A, T, E> {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();
        let mut state = this.ledger.lock();
        let completed = state.completions.len();

        if completed >= this.threshold {
            if let Some(id) = this.registration.take() {
                state.signal.detach(id);
            }
            return Poll::Ready(completed);
        }

        match this.registration {
            Some(id) if state.signal.rearm(id, cx.waker()) => {}
            _ => {
                let id = state.signal.register(this.threshold, cx.waker());
                this.registration = Some(id);
            }
        }
        Poll::Pending
    }
}

impl<A, T, E> Drop for Wait<A, T, E> {
    fn drop(&mut self) {
        if let Some(id) = self.registration.take() {
            self.ledger.lock().signal.detach(id);
        }
    }
}

impl<A, T, E> fmt::Debug for Wait<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("threshold", &self.threshold)
            .field("registered", &self.registration.is_some())
            .finish()
    }
}

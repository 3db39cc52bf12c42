//! Completion-count signal used by ledger waiters.
//!
//! The signal is created inert: nothing is allocated and no waker is held
//! until a waiter suspends for the first time. From then on it keeps one
//! registration per pending waiter.

use std::task::Waker;
use tracing::trace;

/// Two-phase waker registry keyed by completion thresholds.
#[derive(Debug, Default)]
pub(crate) struct CompletionSignal {
    registry: Option<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    waiters: Vec<Registration>,
}

#[derive(Debug)]
struct Registration {
    id: u64,
    threshold: usize,
    waker: Waker,
}

impl CompletionSignal {
    /// Check if a waiter has ever suspended on this signal.
    pub(crate) fn is_bound(&self) -> bool {
        self.registry.is_some()
    }

    /// Number of pending registrations.
    pub(crate) fn pending(&self) -> usize {
        self.registry.as_ref().map_or(0, |registry| registry.waiters.len())
    }

    /// Register a waiter to be woken once `threshold` completions exist.
    pub(crate) fn register(&mut self, threshold: usize, waker: &Waker) -> u64 {
        let registry = self.registry.get_or_insert_with(|| {
            trace!("binding completion signal");
            Registry::default()
        });

        let id = registry.next_id;
        registry.next_id += 1;
        registry.waiters.push(Registration {
            id,
            threshold,
            waker: waker.clone(),
        });
        id
    }

    /// Refresh the waker of a pending registration.
    ///
    /// Returns `false` if the registration no longer exists, e.g. because it
    /// was already woken.
    pub(crate) fn rearm(&mut self, id: u64, waker: &Waker) -> bool {
        let Some(registration) = self
            .registry
            .as_mut()
            .and_then(|registry| registry.waiters.iter_mut().find(|r| r.id == id))
        else {
            return false;
        };
        if !registration.waker.will_wake(waker) {
            registration.waker = waker.clone();
        }
        true
    }

    /// Remove a registration without waking anything.
    pub(crate) fn detach(&mut self, id: u64) {
        if let Some(registry) = self.registry.as_mut() {
            registry.waiters.retain(|registration| registration.id != id);
        }
    }

    /// Remove and return the wakers whose threshold `completed` satisfies.
    ///
    /// Callers wake them after releasing any lock guarding the signal.
    pub(crate) fn take_ready(&mut self, completed: usize) -> Vec<Waker> {
        let Some(registry) = self.registry.as_mut() else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        registry.waiters.retain_mut(|registration| {
            if registration.threshold <= completed {
                ready.push(registration.waker.clone());
                false
            } else {
                true
            }
        });

        if !ready.is_empty() {
            trace!(completed, woken = ready.len(), "waking ledger waiters");
        }
        ready
    }
}

//! Manual step-by-step driver for testing.

use futures::task::noop_waker_ref;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Upper bound of steps for [`ManualDriver::run_to_completion`].
const MAX_STEPS: usize = 10_000;

/// Drives a future one poll at a time.
///
/// Each call to [`step`](ManualDriver::step) is one scheduler step, which
/// makes suspension boundaries observable from the test.
///
/// # Examples
///
/// ```
/// use async_patch::mocks::{suspend, ManualDriver};
///
/// let mut driver = ManualDriver::new(async {
///     suspend().await;
///     42
/// });
///
/// assert!(driver.step().is_pending());
/// assert_eq!(driver.run_to_completion(), 42);
/// assert_eq!(driver.steps(), 2);
/// ```
pub struct ManualDriver<F: Future> {
    future: Option<Pin<Box<F>>>,
    steps: usize,
}

impl<F: Future> ManualDriver<F> {
    /// Wrap a future without polling it.
    pub fn new(future: F) -> Self {
        Self {
            future: Some(Box::pin(future)),
            steps: 0,
        }
    }

    /// Poll the future once.
    ///
    /// # Panics
    /// Panics if the future already completed or was abandoned.
    pub fn step(&mut self) -> Poll<F::Output> {
        let future = self
            .future
            .as_mut()
            .expect("ManualDriver stepped after the future finished");
        let mut cx = Context::from_waker(noop_waker_ref());
        self.steps += 1;

        let polled = future.as_mut().poll(&mut cx);
        if polled.is_ready() {
            self.future = None;
        }
        polled
    }

    /// Step until the future completes.
    ///
    /// # Panics
    /// Panics if the future is still pending after a large number of steps.
    pub fn run_to_completion(&mut self) -> F::Output {
        for _ in 0..MAX_STEPS {
            if let Poll::Ready(output) = self.step() {
                return output;
            }
        }
        panic!("ManualDriver: future still pending after {} steps", MAX_STEPS);
    }

    /// Drop the future before it completes.
    pub fn abandon(&mut self) {
        self.future = None;
    }

    /// Number of polls so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Check if the future completed or was abandoned.
    pub fn is_finished(&self) -> bool {
        self.future.is_none()
    }
}

/// Future that suspends exactly once, scheduling its own continuation.
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless polled"]
pub struct Suspend {
    yielded: bool,
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Suspend the current computation for one step.
pub fn suspend() -> Suspend {
    Suspend::default()
}

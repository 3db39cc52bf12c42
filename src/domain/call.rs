//! Ledger records.

use crate::domain::error::Failure;
use std::fmt;

/// A recorded call of a test double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<A> {
    /// Position of the call in invocation order (0-based)
    pub index: usize,
    /// Arguments the double was called with
    pub args: A,
}

/// A recorded completion of a test double call.
///
/// Completions are appended in the order calls finish, which may differ from
/// the order they were made.
pub struct Completion<A, T, E> {
    /// Invocation index of the call that completed
    pub index: usize,
    /// Arguments of that call
    pub args: A,
    /// Produced value or failure
    pub result: Result<T, Failure<E>>,
}

impl<A, T, E> Completion<A, T, E> {
    /// Check if the call produced a value.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl<A: Clone, T: Clone, E> Clone for Completion<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            args: self.args.clone(),
            result: self.result.clone(),
        }
    }
}

impl<A: fmt::Debug, T: fmt::Debug, E: fmt::Debug> fmt::Debug for Completion<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("index", &self.index)
            .field("args", &self.args)
            .field("result", &self.result)
            .finish()
    }
}

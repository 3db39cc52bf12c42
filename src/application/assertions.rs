//! Verification queries over recorded calls.
//!
//! Queries never mutate the ledger. They return `Err(AssertionError)` with a
//! readable message when the predicate does not hold.

use crate::domain::error::AssertionError;
use std::fmt::Debug;

/// Which side of the ledger a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verb {
    /// Invocations, recorded when the double is called.
    Call,
    /// Completions, recorded when a deferred result is driven to its end.
    Await,
}

impl Verb {
    fn past(self) -> &'static str {
        match self {
            Verb::Call => "called",
            Verb::Await => "awaited",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Verb::Call => "call",
            Verb::Await => "await",
        }
    }
}

/// Argument history of one double, oldest first.
pub(crate) struct History<'a, A> {
    name: &'a str,
    verb: Verb,
    records: Vec<A>,
}

impl<'a, A: PartialEq + Debug> History<'a, A> {
    pub(crate) fn new(name: &'a str, verb: Verb, records: Vec<A>) -> Self {
        Self {
            name,
            verb,
            records,
        }
    }

    fn fail(&self, message: String) -> Result<(), AssertionError> {
        Err(AssertionError::new(message))
    }

    pub(crate) fn at_least_once(&self) -> Result<(), AssertionError> {
        if self.records.is_empty() {
            return self.fail(format!(
                "expected `{}` to have been {}",
                self.name,
                self.verb.past()
            ));
        }
        Ok(())
    }

    pub(crate) fn exactly_once(&self) -> Result<(), AssertionError> {
        if self.records.len() != 1 {
            return self.fail(format!(
                "expected `{}` to have been {} once, {} {} times",
                self.name,
                self.verb.past(),
                self.verb.past(),
                self.records.len()
            ));
        }
        Ok(())
    }

    pub(crate) fn never(&self) -> Result<(), AssertionError> {
        if !self.records.is_empty() {
            return self.fail(format!(
                "expected `{}` to not have been {}, {} {} times",
                self.name,
                self.verb.past(),
                self.verb.past(),
                self.records.len()
            ));
        }
        Ok(())
    }

    /// The most recent record equals `expected`.
    pub(crate) fn last_with(&self, expected: &A) -> Result<(), AssertionError> {
        match self.records.last() {
            None => self.fail(format!(
                "expected {}: {}({:?})\nnot {}",
                self.verb.noun(),
                self.name,
                expected,
                self.verb.past()
            )),
            Some(actual) if actual != expected => self.fail(format!(
                "expected {} not found\nexpected: {}({:?})\nactual: {}({:?})",
                self.verb.noun(),
                self.name,
                expected,
                self.name,
                actual
            )),
            Some(_) => Ok(()),
        }
    }

    /// Some record equals `expected`.
    pub(crate) fn any_with(&self, expected: &A) -> Result<(), AssertionError> {
        if !self.records.contains(expected) {
            return self.fail(format!(
                "{}({:?}) {} not found",
                self.name,
                expected,
                self.verb.noun()
            ));
        }
        Ok(())
    }

    /// There is exactly one record and it equals `expected`.
    pub(crate) fn once_with(&self, expected: &A) -> Result<(), AssertionError> {
        self.exactly_once()?;
        self.last_with(expected)
    }

    /// Every element of `expected` appears in the history.
    ///
    /// Ordered checks require the elements in that relative order, not
    /// necessarily adjacent. Unordered checks treat `expected` as a multiset.
    pub(crate) fn has(&self, expected: &[A], any_order: bool) -> Result<(), AssertionError> {
        let found = if any_order {
            self.contains_multiset(expected)
        } else {
            self.contains_subsequence(expected)
        };
        if found {
            return Ok(());
        }

        let order = if any_order { "in any order" } else { "in order" };
        self.fail(format!(
            "{}s not found {}\nexpected: {:?}\nactual: {:?}",
            self.verb.noun(),
            order,
            expected,
            self.records
        ))
    }

    fn contains_subsequence(&self, expected: &[A]) -> bool {
        let mut records = self.records.iter();
        expected
            .iter()
            .all(|wanted| records.any(|record| record == wanted))
    }

    fn contains_multiset(&self, expected: &[A]) -> bool {
        let mut remaining: Vec<&A> = self.records.iter().collect();
        expected.iter().all(|wanted| {
            match remaining.iter().position(|record| *record == wanted) {
                Some(position) => {
                    remaining.swap_remove(position);
                    true
                }
                None => false,
            }
        })
    }
}

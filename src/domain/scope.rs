//! Activation scope of a substitution.

use std::fmt;

/// Controls when a substitution is visible to a patched computation.
///
/// A scope only matters when the substitution decorates a suspendable
/// computation. Used directly (`activate`/`deactivate`), every substitution
/// behaves the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Active from the first step until the computation terminates, including
    /// while it is suspended.
    #[default]
    Global,
    /// Active only while the computation is being polled; hidden whenever it
    /// suspends.
    Limited,
}

impl Scope {
    /// Check if this is the `Global` scope.
    pub fn is_global(self) -> bool {
        matches!(self, Scope::Global)
    }

    /// Check if this is the `Limited` scope.
    pub fn is_limited(self) -> bool {
        matches!(self, Scope::Limited)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Limited => f.write_str("limited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope_is_global() {
        assert_eq!(Scope::default(), Scope::Global);
        assert!(Scope::default().is_global());
        assert!(!Scope::default().is_limited());
    }

    #[test]
    fn test_display() {
        assert_eq!(Scope::Global.to_string(), "global");
        assert_eq!(Scope::Limited.to_string(), "limited");
    }
}

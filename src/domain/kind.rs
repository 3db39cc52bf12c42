//! Closed set of test double variants.

/// Variant of a test double.
///
/// Capabilities are fixed per variant and queried with the `is_*`/`supports_*`
/// methods rather than discovered on the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoubleKind {
    /// Holds attributes and a ledger but cannot be called.
    NonCallable,
    /// Called synchronously; the outcome is produced at call time.
    Callable,
    /// Like `Callable`, and also answers `len`/`contains`.
    CallableWithContainerProtocol,
    /// Called synchronously, but returns a future that produces the outcome
    /// when driven.
    DeferredResult,
}

impl DoubleKind {
    /// Check if doubles of this kind can be called.
    pub fn is_callable(self) -> bool {
        !matches!(self, DoubleKind::NonCallable)
    }

    /// Check if doubles of this kind implement the container protocol.
    pub fn supports_container_protocol(self) -> bool {
        matches!(self, DoubleKind::CallableWithContainerProtocol)
    }

    /// Check if calls return a deferred result.
    pub fn is_deferred(self) -> bool {
        matches!(self, DoubleKind::DeferredResult)
    }

    /// Kind of a child double generated for an attribute.
    ///
    /// `deferred_shaped` comes from the attribute classifier. Otherwise a
    /// non-callable parent produces callable children and every other kind
    /// reproduces itself.
    pub fn child_kind(self, deferred_shaped: bool) -> DoubleKind {
        if deferred_shaped {
            return DoubleKind::DeferredResult;
        }
        match self {
            DoubleKind::NonCallable => DoubleKind::Callable,
            kind => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(!DoubleKind::NonCallable.is_callable());
        assert!(DoubleKind::Callable.is_callable());
        assert!(DoubleKind::DeferredResult.is_callable());

        assert!(DoubleKind::CallableWithContainerProtocol.supports_container_protocol());
        assert!(!DoubleKind::Callable.supports_container_protocol());

        assert!(DoubleKind::DeferredResult.is_deferred());
        assert!(!DoubleKind::CallableWithContainerProtocol.is_deferred());
    }

    #[test]
    fn test_child_kind() {
        assert_eq!(
            DoubleKind::NonCallable.child_kind(false),
            DoubleKind::Callable
        );
        assert_eq!(
            DoubleKind::CallableWithContainerProtocol.child_kind(false),
            DoubleKind::CallableWithContainerProtocol
        );
        assert_eq!(
            DoubleKind::DeferredResult.child_kind(false),
            DoubleKind::DeferredResult
        );
        assert_eq!(
            DoubleKind::Callable.child_kind(true),
            DoubleKind::DeferredResult
        );
    }
}

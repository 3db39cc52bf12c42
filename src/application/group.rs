//! Ordered stacks of substitutions.
//!
//! A group activates its members in list order and deactivates them in
//! reverse list order. Activation that fails partway unwinds whatever that
//! call had already activated before the error is returned.

use crate::application::activator::{Patched, PatchedFn};
use crate::application::ports::Patch;
use crate::domain::error::PatchError;
use crate::domain::scope::Scope;
use tracing::{debug, warn};

/// An ordered stack of substitutions bound to one computation.
#[derive(Debug, Default)]
pub struct PatchGroup {
    patches: Vec<Box<dyn Patch>>,
}

impl PatchGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a substitution; it activates after the existing ones.
    pub fn with<P: Patch + 'static>(mut self, patch: P) -> Self {
        self.push(Box::new(patch));
        self
    }

    /// Append several substitutions, keeping their order.
    pub fn with_all<P, I>(mut self, patches: I) -> Self
    where
        P: Patch + 'static,
        I: IntoIterator<Item = P>,
    {
        for patch in patches {
            self.push(Box::new(patch));
        }
        self
    }

    /// Append a boxed substitution.
    pub fn push(&mut self, patch: Box<dyn Patch>) {
        self.patches.push(patch);
    }

    /// Place `outer`'s substitutions before this group's ones.
    ///
    /// This is how an outer decorator composes with an inner one: the outer
    /// substitutions activate first and deactivate last.
    pub fn nest_inside(&mut self, outer: PatchGroup) {
        let inner = std::mem::take(&mut self.patches);
        self.patches = outer.patches;
        self.patches.extend(inner);
    }

    /// Number of substitutions in the group.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Check if the group is empty.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Check if any substitution of the group is active.
    pub fn is_active(&self) -> bool {
        self.patches.iter().any(|patch| patch.is_active())
    }

    /// Iterate over the substitutions in activation order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Patch> {
        self.patches.iter().map(|patch| patch.as_ref())
    }

    /// Create an inactive copy of every substitution.
    ///
    /// Each invocation of a decorated factory runs with its own copy, so
    /// concurrent invocations never share activation state.
    pub fn copy(&self) -> PatchGroup {
        PatchGroup {
            patches: self.patches.iter().map(|patch| patch.copy()).collect(),
        }
    }

    /// Activate every substitution in list order.
    ///
    /// # Errors
    /// Returns the first activation error after deactivating the substitutions
    /// this call had activated.
    pub fn activate(&mut self) -> Result<(), PatchError> {
        self.activate_where(None)
    }

    /// Deactivate every substitution in reverse list order.
    ///
    /// Keeps going after a failure and returns the first one.
    pub fn deactivate(&mut self) -> Result<(), PatchError> {
        self.deactivate_where(None)
    }

    /// Activate the substitutions of one scope in list order.
    pub fn activate_scope(&mut self, scope: Scope) -> Result<(), PatchError> {
        self.activate_where(Some(scope))
    }

    /// Deactivate the substitutions of one scope in reverse list order.
    pub fn deactivate_scope(&mut self, scope: Scope) -> Result<(), PatchError> {
        self.deactivate_where(Some(scope))
    }

    /// Deactivate everything, logging failures instead of returning them.
    ///
    /// Used while unwinding after another error, which must not be masked.
    pub(crate) fn unwind(&mut self) {
        if let Err(error) = self.deactivate() {
            warn!(%error, "failed to restore a substitution while unwinding");
        }
    }

    /// Wrap an already constructed computation.
    pub fn wrap<T>(self, computation: T) -> Patched<T> {
        Patched::new(computation, self)
    }

    /// Decorate a factory of computations.
    pub fn decorate<G>(self, factory: G) -> PatchedFn<G> {
        PatchedFn::new(factory, self)
    }

    fn activate_where(&mut self, wanted: Option<Scope>) -> Result<(), PatchError> {
        let mut entered = Vec::with_capacity(self.patches.len());

        for index in 0..self.patches.len() {
            if !in_scope(self.patches[index].as_ref(), wanted) {
                continue;
            }
            if let Err(error) = self.patches[index].activate() {
                debug!(
                    patch = %self.patches[index].target(),
                    %error,
                    "activation failed, unwinding"
                );
                for &entered_index in entered.iter().rev() {
                    let patch: &mut Box<dyn Patch> = &mut self.patches[entered_index];
                    if let Err(unwind_error) = patch.deactivate() {
                        warn!(
                            patch = %patch.target(),
                            error = %unwind_error,
                            "failed to restore a substitution while unwinding"
                        );
                    }
                }
                return Err(error);
            }
            entered.push(index);
        }

        if !entered.is_empty() {
            debug!(scope = ?wanted, count = entered.len(), "activated substitutions");
        }
        Ok(())
    }

    fn deactivate_where(&mut self, wanted: Option<Scope>) -> Result<(), PatchError> {
        let mut first_error = None;
        let mut restored = 0usize;

        for patch in self.patches.iter_mut().rev() {
            if !in_scope(patch.as_ref(), wanted) || !patch.is_active() {
                continue;
            }
            match patch.deactivate() {
                Ok(()) => restored += 1,
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        if restored > 0 {
            debug!(scope = ?wanted, count = restored, "deactivated substitutions");
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn in_scope(patch: &dyn Patch, wanted: Option<Scope>) -> bool {
    wanted.map_or(true, |scope| patch.scope() == scope)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::error::{ConfigurationError, StateError};
    use std::sync::{Arc, Mutex};

    /// Substitution that records its transitions into a shared journal.
    #[derive(Debug)]
    pub(crate) struct JournalPatch {
        pub(crate) name: &'static str,
        pub(crate) scope: Scope,
        pub(crate) active: bool,
        pub(crate) fail_activation: bool,
        pub(crate) journal: Arc<Mutex<Vec<String>>>,
    }

    impl JournalPatch {
        pub(crate) fn new(
            name: &'static str,
            scope: Scope,
            journal: &Arc<Mutex<Vec<String>>>,
        ) -> Self {
            Self {
                name,
                scope,
                active: false,
                fail_activation: false,
                journal: Arc::clone(journal),
            }
        }

        pub(crate) fn failing(mut self) -> Self {
            self.fail_activation = true;
            self
        }
    }

    impl Patch for JournalPatch {
        fn scope(&self) -> Scope {
            self.scope
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn activate(&mut self) -> Result<(), PatchError> {
            if self.active {
                return Err(StateError::AlreadyActive(self.name.into()).into());
            }
            if self.fail_activation {
                return Err(ConfigurationError::MissingAttribute {
                    container: "journal".into(),
                    name: self.name.into(),
                }
                .into());
            }
            self.active = true;
            self.journal.lock().unwrap().push(format!("+{}", self.name));
            Ok(())
        }

        fn deactivate(&mut self) -> Result<(), PatchError> {
            if self.active {
                self.active = false;
                self.journal.lock().unwrap().push(format!("-{}", self.name));
            }
            Ok(())
        }

        fn copy(&self) -> Box<dyn Patch> {
            Box::new(JournalPatch {
                active: false,
                journal: Arc::clone(&self.journal),
                ..*self
            })
        }

        fn target(&self) -> String {
            self.name.to_string()
        }
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_stack_discipline() {
        let log = journal();
        let mut group = PatchGroup::new()
            .with(JournalPatch::new("a", Scope::Global, &log))
            .with(JournalPatch::new("b", Scope::Limited, &log))
            .with(JournalPatch::new("c", Scope::Global, &log));

        group.activate().unwrap();
        assert!(group.is_active());
        group.deactivate().unwrap();
        assert!(!group.is_active());

        assert_eq!(*log.lock().unwrap(), ["+a", "+b", "+c", "-c", "-b", "-a"]);
    }

    #[test]
    fn test_scoped_activation() {
        let log = journal();
        let mut group = PatchGroup::new()
            .with(JournalPatch::new("g", Scope::Global, &log))
            .with(JournalPatch::new("l", Scope::Limited, &log));

        group.activate_scope(Scope::Limited).unwrap();
        group.deactivate_scope(Scope::Limited).unwrap();
        group.activate_scope(Scope::Global).unwrap();

        assert_eq!(*log.lock().unwrap(), ["+l", "-l", "+g"]);
    }

    #[test]
    fn test_failed_activation_unwinds() {
        let log = journal();
        let mut group = PatchGroup::new()
            .with(JournalPatch::new("a", Scope::Global, &log))
            .with(JournalPatch::new("b", Scope::Global, &log))
            .with(JournalPatch::new("broken", Scope::Global, &log).failing())
            .with(JournalPatch::new("d", Scope::Global, &log));

        let err = group.activate().unwrap_err();
        assert!(matches!(err, PatchError::Configuration(_)));
        assert!(!group.is_active());
        assert_eq!(*log.lock().unwrap(), ["+a", "+b", "-b", "-a"]);
    }

    #[test]
    fn test_double_activation_is_rejected() {
        let log = journal();
        let mut group = PatchGroup::new().with(JournalPatch::new("a", Scope::Global, &log));

        group.activate().unwrap();
        let err = group.activate().unwrap_err();
        assert_eq!(err, PatchError::State(StateError::AlreadyActive("a".into())));
        // The already active substitution was not touched by the failed call
        assert!(group.is_active());
    }

    #[test]
    fn test_copy_is_inactive_and_independent() {
        let log = journal();
        let mut group = PatchGroup::new().with(JournalPatch::new("a", Scope::Global, &log));
        group.activate().unwrap();

        let mut copy = group.copy();
        assert!(!copy.is_active());
        copy.activate().unwrap();
        copy.deactivate().unwrap();
        assert!(group.is_active());
    }

    #[test]
    fn test_nest_inside_puts_outer_first() {
        let log = journal();
        let mut inner = PatchGroup::new().with(JournalPatch::new("inner", Scope::Global, &log));
        let outer = PatchGroup::new().with(JournalPatch::new("outer", Scope::Global, &log));
        inner.nest_inside(outer);

        inner.activate().unwrap();
        inner.deactivate().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["+outer", "+inner", "-inner", "-outer"]
        );
    }
}

//! Whole-container substitutions.
//!
//! A [`MappingPatch`] overwrites entries of a namespace and restores the full
//! pre-activation contents afterwards. Global mapping substitutions register
//! their deltas and base snapshot on the namespace while active, so when any
//! mapping substitution on the same namespace restores its snapshot, the
//! overrides of still-active global siblings are applied again. A global
//! sibling that ends before a later one passes its base on, so the last one
//! to end restores the contents from before the first activation.
//!
//! A limited mapping substitution also remembers what the computation wrote
//! into the namespace during a step: at deactivation, entries that were added
//! or changed are folded into its deltas and come back on the next
//! activation.

use crate::application::ports::{Patch, Resolver};
use crate::domain::error::{ConfigurationError, PatchError, StateError};
use crate::domain::scope::Scope;
use crate::infrastructure::namespace::{next_id, Namespace, Snapshot};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

/// Temporary overwrite of entries of a namespace.
///
/// # Example
/// ```
/// use async_patch::{MappingPatch, Namespace, Patch};
///
/// let env = Namespace::with_entries("os.environ", [("HOME", "/home/me")]);
/// let mut patch = MappingPatch::new(&env, [("LANG", "C")]).clear();
///
/// patch.activate().unwrap();
/// assert_eq!(env.keys(), ["LANG"]);
///
/// patch.deactivate().unwrap();
/// assert_eq!(env.keys(), ["HOME"]);
/// ```
pub struct MappingPatch<V> {
    id: u64,
    namespace: Namespace<V>,
    deltas: Vec<(String, V)>,
    clear: bool,
    scope: Scope,
    snapshot: Option<Snapshot<V>>,
    // Values of the delta keys right after the last limited deactivation
    baseline: Option<BTreeMap<String, Option<V>>>,
}

impl<V> MappingPatch<V> {
    /// Overwrite `pairs` in `namespace`. An empty list is allowed, e.g. for a
    /// clearing substitution.
    pub fn new<I, K>(namespace: &Namespace<V>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let mut patch = Self {
            id: next_id(),
            namespace: namespace.clone(),
            deltas: Vec::new(),
            clear: false,
            scope: Scope::Global,
            snapshot: None,
            baseline: None,
        };
        for (key, value) in pairs {
            patch.upsert(key.into(), value);
        }
        patch
    }

    /// Overwrite `pairs` in `namespace`, requiring at least one pair.
    ///
    /// # Errors
    /// Returns `ConfigurationError::EmptyBatch` when `pairs` is empty.
    pub fn batch<I, K>(namespace: &Namespace<V>, pairs: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let patch = Self::new(namespace, pairs);
        if patch.deltas.is_empty() {
            return Err(ConfigurationError::EmptyBatch);
        }
        Ok(patch)
    }

    /// Overwrite `pairs` in the namespace registered at `path`.
    ///
    /// # Errors
    /// Returns the resolver's `ConfigurationError` when `path` is unknown.
    pub fn from_locator<R, I, K>(
        resolver: &R,
        path: &str,
        pairs: I,
    ) -> Result<Self, ConfigurationError>
    where
        R: Resolver<Container = Namespace<V>>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let namespace = resolver.container(path)?;
        Ok(Self::new(&namespace, pairs))
    }

    /// Remove every existing entry before applying the deltas.
    pub fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    /// Set the scope. Defaults to `Global`.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Only apply the deltas while the computation is running a step.
    pub fn limited(self) -> Self {
        self.with_scope(Scope::Limited)
    }

    /// Namespace being overwritten.
    pub fn namespace(&self) -> &Namespace<V> {
        &self.namespace
    }

    /// Entries applied on activation, in application order.
    pub fn deltas(&self) -> &[(String, V)] {
        &self.deltas
    }

    fn upsert(&mut self, key: String, value: V) {
        match self.deltas.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.deltas.push((key, value)),
        }
    }
}

impl<V: Clone + PartialEq> MappingPatch<V> {
    /// A key an active global sibling overrides and whose visible value
    /// changed since this substitution last stepped aside keeps that value.
    fn yields_to_sibling(&self, key: &str) -> bool {
        let Some(baseline) = &self.baseline else {
            return false;
        };
        if !self.namespace.globally_owned(key, self.id) {
            return false;
        }
        let visible = self.namespace.get(key);
        baseline.get(key).map_or(false, |before| *before != visible)
    }

    fn fold_step_mutations(&mut self, snapshot: &Snapshot<V>) {
        let mut folded = 0usize;
        for (key, value) in self.namespace.snapshot() {
            if snapshot.get(&key) != Some(&value) {
                self.upsert(key, value);
                folded += 1;
            }
        }
        if folded > 0 {
            trace!(
                namespace = %self.namespace.name(),
                folded,
                "kept mutations made during the step"
            );
        }
    }
}

impl<V> Patch for MappingPatch<V>
where
    V: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn scope(&self) -> Scope {
        self.scope
    }

    fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    fn activate(&mut self) -> Result<(), PatchError> {
        if self.snapshot.is_some() {
            return Err(StateError::AlreadyActive(self.target()).into());
        }

        let snapshot = self.namespace.snapshot();
        if self.clear {
            self.namespace.clear();
        }
        for (key, value) in &self.deltas {
            if self.yields_to_sibling(key) {
                debug!(
                    patch = %self.target(),
                    key = %key,
                    "keeping value set by a global sibling"
                );
                continue;
            }
            self.namespace.set(key.clone(), value.clone());
        }
        if self.scope.is_global() {
            self.namespace
                .register_global(self.id, self.deltas.clone(), snapshot.clone());
        }

        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), PatchError> {
        let Some(snapshot) = self.snapshot.take() else {
            return Ok(());
        };

        let (base, registered) = match self.scope {
            Scope::Global => match self.namespace.unregister_global(self.id) {
                Some(base) => (base, true),
                None => (snapshot, false),
            },
            Scope::Limited => {
                self.fold_step_mutations(&snapshot);
                (snapshot, true)
            }
        };

        self.namespace.restore(&base);
        self.namespace.reapply_globals();

        if self.scope.is_limited() {
            self.baseline = Some(
                self.deltas
                    .iter()
                    .map(|(key, _)| (key.clone(), self.namespace.get(key)))
                    .collect(),
            );
        }

        if !registered {
            return Err(StateError::UnknownSibling(self.target()).into());
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Patch> {
        Box::new(MappingPatch {
            id: next_id(),
            namespace: self.namespace.clone(),
            deltas: self.deltas.clone(),
            clear: self.clear,
            scope: self.scope,
            snapshot: None,
            baseline: None,
        })
    }

    fn target(&self) -> String {
        self.namespace.name().to_string()
    }
}

impl<V: fmt::Debug> fmt::Debug for MappingPatch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingPatch")
            .field("namespace", &self.namespace.name())
            .field("deltas", &self.deltas)
            .field("clear", &self.clear)
            .field("scope", &self.scope)
            .field("active", &self.snapshot.is_some())
            .finish()
    }
}

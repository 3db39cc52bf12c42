//! Named, shared containers of substitutable values.
//!
//! A [`Namespace`] is what substitutions target: a concurrent map from
//! attribute name to value, shared by every handle clone. It also keeps two
//! registries of active substitutions:
//!
//! - per attribute, the stack of originals captured by attribute
//!   substitutions, so a copy that ends out of order hands its original to
//!   the copy activated after it instead of restoring a stale value
//! - the active global mapping substitutions with their base snapshots, so
//!   one deactivation can re-apply the overrides of siblings that are still
//!   running and the last one restores the contents from before the first

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id of one substitution instance, used as its registry key.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Full contents of a namespace at one point in time.
///
/// Keys missing from the snapshot did not exist, which is distinct from any
/// value.
pub type Snapshot<V> = BTreeMap<String, V>;

struct Overlay<V> {
    id: u64,
    deltas: Vec<(String, V)>,
    base: Snapshot<V>,
}

/// Value an attribute substitution replaced; `None` if it created the key.
struct Installed<V> {
    id: u64,
    original: Option<V>,
}

/// Outcome of removing an attribute substitution from its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Uninstall {
    /// Latest activation on the key; the original is back in place.
    Restored,
    /// A later activation is still installed and now owns the original.
    HandedOver,
    /// No activation with this id is installed on the key.
    Unknown,
}

struct NamespaceInner<V> {
    name: String,
    entries: DashMap<String, V>,
    installed: Mutex<BTreeMap<String, Vec<Installed<V>>>>,
    overlays: Mutex<Vec<Overlay<V>>>,
}

/// Thread-safe named container backed by DashMap.
///
/// # Example
/// ```
/// use async_patch::Namespace;
///
/// let settings = Namespace::new("app.settings");
/// settings.set("retries", 3);
///
/// let view = settings.clone();
/// view.set("retries", 5);
/// assert_eq!(settings.get("retries"), Some(5));
/// ```
pub struct Namespace<V> {
    inner: Arc<NamespaceInner<V>>,
}

impl<V> Namespace<V> {
    /// Create an empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                name: name.into(),
                entries: DashMap::new(),
                installed: Mutex::new(BTreeMap::new()),
                overlays: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a namespace with initial entries.
    pub fn with_entries<I, K>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let namespace = Self::new(name);
        for (key, value) in entries {
            namespace.inner.entries.insert(key.into(), value);
        }
        namespace
    }

    /// Dotted path of the namespace.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Check if both handles refer to the same namespace.
    pub fn same_namespace(&self, other: &Namespace<V>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Insert or update a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.entries.insert(key.into(), value)
    }

    /// Remove a key and return its value.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.entries.remove(key).map(|(_, value)| value)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Check if the namespace is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Sorted list of keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock_overlays(&self) -> MutexGuard<'_, Vec<Overlay<V>>> {
        self.inner
            .overlays
            .lock()
            .expect("Namespace overlay mutex poisoned - a thread panicked while holding the lock")
    }

    fn lock_installed(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Installed<V>>>> {
        self.inner
            .installed
            .lock()
            .expect("Namespace install mutex poisoned - a thread panicked while holding the lock")
    }

    /// Replace `key` with `value`, remembering the replaced value under `id`.
    ///
    /// Returns `false` and changes nothing when `key` is missing and `create`
    /// is not set.
    pub(crate) fn install(&self, key: &str, id: u64, value: V, create: bool) -> bool {
        let mut installed = self.lock_installed();
        if !create && !self.inner.entries.contains_key(key) {
            return false;
        }
        let original = self.inner.entries.insert(key.to_string(), value);
        installed
            .entry(key.to_string())
            .or_default()
            .push(Installed { id, original });
        true
    }

    /// Undo the installation `id` of `key`.
    ///
    /// Only the latest installation writes the original back. An earlier one
    /// passes its original to the installation that followed it.
    pub(crate) fn uninstall(&self, key: &str, id: u64) -> Uninstall {
        let mut installed = self.lock_installed();
        let Some(stack) = installed.get_mut(key) else {
            return Uninstall::Unknown;
        };
        let Some(position) = stack.iter().position(|entry| entry.id == id) else {
            return Uninstall::Unknown;
        };

        let removed = stack.remove(position);
        let outcome = match stack.get_mut(position) {
            Some(later) => {
                later.original = removed.original;
                Uninstall::HandedOver
            }
            None => {
                if let Some(value) = removed.original {
                    self.inner.entries.insert(key.to_string(), value);
                } else {
                    self.inner.entries.remove(key);
                }
                Uninstall::Restored
            }
        };
        if stack.is_empty() {
            installed.remove(key);
        }
        outcome
    }

    /// Number of attribute substitutions installed on `key`.
    pub fn installed_on(&self, key: &str) -> usize {
        self.lock_installed().get(key).map_or(0, Vec::len)
    }

    /// Register an active global mapping substitution with the contents it
    /// found on activation.
    pub(crate) fn register_global(
        &self,
        id: u64,
        deltas: Vec<(String, V)>,
        base: Snapshot<V>,
    ) {
        self.lock_overlays().push(Overlay { id, deltas, base });
    }

    /// Check if an active global mapping substitution other than `except`
    /// overrides `key`.
    pub(crate) fn globally_owned(&self, key: &str, except: u64) -> bool {
        self.lock_overlays().iter().any(|overlay| {
            overlay.id != except && overlay.deltas.iter().any(|(owned, _)| owned == key)
        })
    }

    /// Number of active global mapping substitutions.
    pub fn active_globals(&self) -> usize {
        self.lock_overlays().len()
    }
}

impl<V: Clone> Namespace<V> {
    /// Remove a registration and return the contents to restore, or `None`
    /// if `id` was not registered.
    ///
    /// A sibling registered later inherits the returned base, so whichever
    /// sibling ends last restores the contents from before the first.
    pub(crate) fn unregister_global(&self, id: u64) -> Option<Snapshot<V>> {
        let mut overlays = self.lock_overlays();
        let position = overlays.iter().position(|overlay| overlay.id == id)?;
        let removed = overlays.remove(position);
        if let Some(later) = overlays.get_mut(position) {
            later.base = removed.base.clone();
        }
        Some(removed.base)
    }

    /// Value `id` replaced on `key`, if installed.
    pub(crate) fn original_of(&self, key: &str, id: u64) -> Option<Option<V>> {
        self.lock_installed()
            .get(key)?
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.original.clone())
    }

    /// Get a clone of a value.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Copy the full contents.
    pub fn snapshot(&self) -> Snapshot<V> {
        self.inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Replace the full contents with `snapshot`.
    pub fn restore(&self, snapshot: &Snapshot<V>) {
        self.inner.entries.clear();
        for (key, value) in snapshot {
            self.inner.entries.insert(key.clone(), value.clone());
        }
    }

    /// Re-apply the deltas of every active global mapping substitution, in
    /// registration order.
    pub(crate) fn reapply_globals(&self) {
        let overlays = self.lock_overlays();
        for overlay in overlays.iter() {
            for (key, value) in &overlay.deltas {
                self.inner.entries.insert(key.clone(), value.clone());
            }
        }
        if !overlays.is_empty() {
            trace!(
                namespace = %self.inner.name,
                count = overlays.len(),
                "re-applied global overlays"
            );
        }
    }
}

impl<V> Clone for Namespace<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Namespace<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.inner.name)
            .field("len", &self.inner.entries.len())
            .finish()
    }
}

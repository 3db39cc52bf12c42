//! Attribute substitutions on namespaces.
//!
//! The value a substitution replaces is kept on the namespace, per attribute,
//! in activation order. Copies of one substitution that overlap (concurrent
//! invocations of a decorated factory) can end in any order: only the latest
//! activation writes its original back, an earlier one hands its original to
//! the activation that followed it.

use crate::application::group::PatchGroup;
use crate::application::ports::{Patch, Resolver};
use crate::domain::error::{ConfigurationError, PatchError, StateError};
use crate::domain::scope::Scope;
use crate::infrastructure::namespace::{next_id, Namespace, Uninstall};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Value installed by a substitution.
pub enum Replacement<V> {
    /// Install a clone of this value.
    Value(V),
    /// Build the value on first activation; later activations of the same
    /// substitution reuse it.
    Factory(Arc<dyn Fn() -> V + Send + Sync>),
}

impl<V> Replacement<V> {
    /// Build the replacement lazily with `factory`.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        Replacement::Factory(Arc::new(factory))
    }
}

impl<V: Clone> Clone for Replacement<V> {
    fn clone(&self) -> Self {
        match self {
            Replacement::Value(value) => Replacement::Value(value.clone()),
            Replacement::Factory(factory) => Replacement::Factory(Arc::clone(factory)),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Replacement<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Replacement::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Temporary replacement of one attribute of a namespace.
///
/// # Example
/// ```
/// use async_patch::{Namespace, Patch, Substitution};
///
/// let module = Namespace::new("app.http");
/// module.set("timeout", 30);
///
/// let mut timeout = Substitution::object(&module, "timeout", 1);
/// timeout.activate().unwrap();
/// assert_eq!(module.get("timeout"), Some(1));
///
/// timeout.deactivate().unwrap();
/// assert_eq!(module.get("timeout"), Some(30));
/// ```
pub struct Substitution<V> {
    id: u64,
    namespace: Namespace<V>,
    name: String,
    replacement: Replacement<V>,
    produced: Option<V>,
    scope: Scope,
    create: bool,
    active: bool,
}

impl<V> Substitution<V> {
    /// Substitute `name` in `namespace` with `replacement`.
    pub fn new(
        namespace: &Namespace<V>,
        name: impl Into<String>,
        replacement: Replacement<V>,
    ) -> Self {
        Self {
            id: next_id(),
            namespace: namespace.clone(),
            name: name.into(),
            replacement,
            produced: None,
            scope: Scope::Global,
            create: false,
            active: false,
        }
    }

    /// Substitute `name` in `namespace` with `value`.
    pub fn object(namespace: &Namespace<V>, name: impl Into<String>, value: V) -> Self {
        Self::new(namespace, name, Replacement::Value(value))
    }

    /// Substitute `name` in `namespace` with the product of `factory`.
    pub fn with_factory<F>(
        namespace: &Namespace<V>,
        name: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        Self::new(namespace, name, Replacement::factory(factory))
    }

    /// Set the scope. Defaults to `Global`.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Only show the replacement while the computation is running a step.
    pub fn limited(self) -> Self {
        self.with_scope(Scope::Limited)
    }

    /// Allow substituting a missing attribute; it is removed again on
    /// deactivation.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Namespace holding the target.
    pub fn namespace(&self) -> &Namespace<V> {
        &self.namespace
    }

    /// Attribute name of the target.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V: Clone> Substitution<V> {
    /// Value this substitution restores when it ends.
    ///
    /// `None` while inactive, `Some(None)` if the attribute was created. An
    /// earlier overlapping copy that ended first passes its original on, so
    /// this is not always the value seen at activation.
    pub fn original(&self) -> Option<Option<V>> {
        if !self.active {
            return None;
        }
        self.namespace.original_of(&self.name, self.id)
    }

    fn missing_attribute(&self) -> ConfigurationError {
        ConfigurationError::MissingAttribute {
            container: self.namespace.name().to_string(),
            name: self.name.clone(),
        }
    }

    fn replacement_value(&mut self) -> V {
        match &self.replacement {
            Replacement::Value(value) => value.clone(),
            Replacement::Factory(factory) => self.produced.get_or_insert_with(|| factory()).clone(),
        }
    }
}

impl<V> Patch for Substitution<V>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn scope(&self) -> Scope {
        self.scope
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self) -> Result<(), PatchError> {
        if self.active {
            return Err(StateError::AlreadyActive(self.target()).into());
        }
        if !self.create && !self.namespace.contains(&self.name) {
            return Err(self.missing_attribute().into());
        }

        let value = self.replacement_value();
        if !self.namespace.install(&self.name, self.id, value, self.create) {
            return Err(self.missing_attribute().into());
        }
        self.active = true;
        trace!(patch = %self.target(), "installed replacement");
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), PatchError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        match self.namespace.uninstall(&self.name, self.id) {
            Uninstall::Restored => trace!(patch = %self.target(), "restored original"),
            Uninstall::HandedOver => debug!(
                patch = %self.target(),
                "later copy still installed, handed over the original"
            ),
            Uninstall::Unknown => {
                return Err(StateError::UnknownSibling(self.target()).into());
            }
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Patch> {
        Box::new(Substitution {
            id: next_id(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            replacement: self.replacement.clone(),
            produced: None,
            scope: self.scope,
            create: self.create,
            active: false,
        })
    }

    fn target(&self) -> String {
        format!("{}.{}", self.namespace.name(), self.name)
    }
}

impl<V: fmt::Debug> fmt::Debug for Substitution<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitution")
            .field("namespace", &self.namespace.name())
            .field("name", &self.name)
            .field("replacement", &self.replacement)
            .field("scope", &self.scope)
            .field("create", &self.create)
            .field("active", &self.active)
            .finish()
    }
}

/// Substitute the attribute at `locator` with `value`.
///
/// The container is resolved now; the attribute itself is looked up when the
/// substitution activates.
///
/// # Errors
/// Returns the resolver's `ConfigurationError` for malformed locators or
/// unknown containers.
pub fn patch<R, V>(
    resolver: &R,
    locator: &str,
    value: V,
) -> Result<Substitution<V>, ConfigurationError>
where
    R: Resolver<Container = Namespace<V>>,
{
    let (namespace, name) = resolver.resolve(locator)?;
    Ok(Substitution::object(&namespace, name, value))
}

/// Substitute `name` in `namespace` with `value`.
pub fn patch_object<V>(
    namespace: &Namespace<V>,
    name: impl Into<String>,
    value: V,
) -> Substitution<V> {
    Substitution::object(namespace, name, value)
}

/// Substitute several attributes of the container at `path` at once.
///
/// The substitutions share `scope` and activate in the given order.
///
/// # Errors
/// Returns `ConfigurationError::EmptyBatch` when `pairs` is empty, or the
/// resolver's error when `path` is unknown.
pub fn patch_multiple<R, V, I, K>(
    resolver: &R,
    path: &str,
    pairs: I,
    scope: Scope,
) -> Result<PatchGroup, ConfigurationError>
where
    R: Resolver<Container = Namespace<V>>,
    V: Clone + Send + Sync + fmt::Debug + 'static,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
{
    let namespace = resolver.container(path)?;
    let group = PatchGroup::new().with_all(
        pairs
            .into_iter()
            .map(|(name, value)| Substitution::object(&namespace, name, value).with_scope(scope)),
    );
    if group.is_empty() {
        return Err(ConfigurationError::EmptyBatch);
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::resolver::ModuleRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn module() -> Namespace<&'static str> {
        Namespace::with_entries("app.db", [("driver", "postgres")])
    }

    #[test]
    fn test_activate_and_restore() {
        let module = module();
        let mut substitution = Substitution::object(&module, "driver", "sqlite");

        assert!(substitution.original().is_none());
        substitution.activate().unwrap();
        assert_eq!(module.get("driver"), Some("sqlite"));
        assert_eq!(substitution.original(), Some(Some("postgres")));

        substitution.deactivate().unwrap();
        substitution.deactivate().unwrap();
        assert_eq!(module.get("driver"), Some("postgres"));
        assert!(!substitution.is_active());
    }

    #[test]
    fn test_double_activation() {
        let module = module();
        let mut substitution = Substitution::object(&module, "driver", "sqlite");
        substitution.activate().unwrap();

        assert_eq!(
            substitution.activate().unwrap_err(),
            PatchError::State(StateError::AlreadyActive("app.db.driver".into()))
        );
    }

    #[test]
    fn test_missing_attribute_needs_create() {
        let module = module();
        let mut strict = Substitution::object(&module, "pool", "small");
        assert!(matches!(
            strict.activate().unwrap_err(),
            PatchError::Configuration(ConfigurationError::MissingAttribute { .. })
        ));

        let mut created = Substitution::object(&module, "pool", "small").create(true);
        created.activate().unwrap();
        assert_eq!(module.get("pool"), Some("small"));
        created.deactivate().unwrap();
        assert!(!module.contains("pool"));
    }

    #[test]
    fn test_overlapping_copies_end_in_any_order() {
        let module = module();
        let template = Substitution::object(&module, "driver", "sqlite");

        for first_to_end in [0, 1] {
            let mut copies = [template.copy(), template.copy()];
            copies[0].activate().unwrap();
            copies[1].activate().unwrap();

            copies[first_to_end].deactivate().unwrap();
            assert_eq!(module.get("driver"), Some("sqlite"));
            copies[1 - first_to_end].deactivate().unwrap();

            assert_eq!(module.get("driver"), Some("postgres"));
            assert_eq!(module.installed_on("driver"), 0);
        }
    }

    #[test]
    fn test_handed_over_original() {
        let module = module();
        let mut first = Substitution::object(&module, "driver", "sqlite");
        let mut second = Substitution::object(&module, "driver", "mysql");

        first.activate().unwrap();
        second.activate().unwrap();
        assert_eq!(second.original(), Some(Some("sqlite")));

        first.deactivate().unwrap();
        assert_eq!(module.get("driver"), Some("mysql"));
        assert_eq!(second.original(), Some(Some("postgres")));
        assert_eq!(first.original(), None);

        second.deactivate().unwrap();
        assert_eq!(module.get("driver"), Some("postgres"));
    }

    #[test]
    fn test_factory_runs_once_per_instance() {
        let module = module();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut substitution = Substitution::with_factory(&module, "driver", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "mock"
        });

        for _ in 0..3 {
            substitution.activate().unwrap();
            substitution.deactivate().unwrap();
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let mut copy = substitution.copy();
        copy.activate().unwrap();
        copy.deactivate().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_patch_by_locator() {
        let registry = ModuleRegistry::new();
        registry.register(module());

        let mut substitution = patch(&registry, "app.db.driver", "mysql").unwrap();
        assert_eq!(substitution.target(), "app.db.driver");
        substitution.activate().unwrap();
        assert_eq!(registry.container("app.db").unwrap().get("driver"), Some("mysql"));
        substitution.deactivate().unwrap();

        assert!(matches!(
            patch(&registry, "driver", "mysql"),
            Err(ConfigurationError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_patch_multiple() {
        let registry = ModuleRegistry::new();
        let db = registry.register(Namespace::with_entries(
            "app.db",
            [("host", "db"), ("port", "5432")],
        ));

        let mut group = patch_multiple(
            &registry,
            "app.db",
            [("host", "localhost"), ("port", "1")],
            Scope::Global,
        )
        .unwrap();
        assert_eq!(group.len(), 2);

        group.activate().unwrap();
        assert_eq!(db.get("host"), Some("localhost"));
        group.deactivate().unwrap();
        assert_eq!(db.get("port"), Some("5432"));

        let empty: [(&str, &str); 0] = [];
        assert_eq!(
            patch_multiple(&registry, "app.db", empty, Scope::Global).unwrap_err(),
            ConfigurationError::EmptyBatch
        );
    }
}

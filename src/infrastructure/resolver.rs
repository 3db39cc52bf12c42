//! Locator resolution against registered namespaces.

use crate::application::ports::Resolver;
use crate::domain::error::ConfigurationError;
use crate::infrastructure::namespace::Namespace;
use dashmap::DashMap;
use std::fmt;

/// Registry of namespaces addressable by dotted path.
///
/// A locator `"pkg.module.attr"` resolves to the namespace registered as
/// `"pkg.module"` and the attribute `"attr"`.
pub struct ModuleRegistry<V> {
    modules: DashMap<String, Namespace<V>>,
}

impl<V> ModuleRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
        }
    }

    /// Register a namespace under its own name, replacing any previous one.
    pub fn register(&self, namespace: Namespace<V>) -> Namespace<V> {
        self.modules
            .insert(namespace.name().to_string(), namespace.clone());
        namespace
    }

    /// Get the namespace at `path`, creating and registering it if missing.
    pub fn module(&self, path: &str) -> Namespace<V> {
        self.modules
            .entry(path.to_string())
            .or_insert_with(|| Namespace::new(path))
            .clone()
    }

    /// Number of registered namespaces.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<V> Default for ModuleRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ModuleRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<String> = self.modules.iter().map(|m| m.key().clone()).collect();
        paths.sort();
        f.debug_struct("ModuleRegistry").field("modules", &paths).finish()
    }
}

impl<V: Send + Sync> Resolver for ModuleRegistry<V> {
    type Container = Namespace<V>;

    fn resolve(&self, locator: &str) -> Result<(Namespace<V>, String), ConfigurationError> {
        let Some((path, attribute)) = locator.rsplit_once('.') else {
            return Err(ConfigurationError::InvalidLocator(locator.to_string()));
        };
        if path.is_empty() || attribute.is_empty() {
            return Err(ConfigurationError::InvalidLocator(locator.to_string()));
        }
        Ok((self.container(path)?, attribute.to_string()))
    }

    fn container(&self, path: &str) -> Result<Namespace<V>, ConfigurationError> {
        self.modules
            .get(path)
            .map(|module| module.value().clone())
            .ok_or_else(|| ConfigurationError::UnknownContainer(path.to_string()))
    }
}

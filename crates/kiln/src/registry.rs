// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Extension-keyed loader lookup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::loader::Loader;
use crate::router::{extension_of, normalize_extension};

/// Maps file extensions to loaders.
///
/// Extensions are case-insensitive. Registering an extension that already
/// has a loader replaces it: the last registration wins.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: BTreeMap<String, Arc<dyn Loader>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.loaders.iter().map(|(ext, l)| (ext, l.name())))
            .finish()
    }
}

impl LoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` for the extensions it declares.
    pub fn register(&mut self, loader: Arc<dyn Loader>) -> &mut Self {
        let extensions = loader.extensions();
        self.register_as(extensions, loader)
    }

    /// Registers `loader` for `extensions`, ignoring the ones it declares.
    pub fn register_as<I, S>(&mut self, extensions: I, loader: Arc<dyn Loader>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref());
            if let Some(previous) = self.loaders.insert(ext.clone(), loader.clone()) {
                tracing::debug!(
                    extension = %ext,
                    previous = previous.name(),
                    loader = loader.name(),
                    "loader replaced"
                );
            }
        }
        self
    }

    /// The loader for `extension` (`"scss"` or `".SCSS"` alike).
    pub fn lookup(&self, extension: &str) -> Option<Arc<dyn Loader>> {
        self.loaders.get(&normalize_extension(extension)).cloned()
    }

    /// The loader for the extension of `path`.
    pub fn lookup_path(&self, path: &Path) -> Option<Arc<dyn Loader>> {
        extension_of(path).and_then(|ext| self.loaders.get(&ext).cloned())
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        self.loaders.keys().cloned().collect()
    }

    /// Distinct loaders, in extension order.
    pub fn loaders(&self) -> Vec<Arc<dyn Loader>> {
        let mut unique: Vec<Arc<dyn Loader>> = Vec::new();
        for loader in self.loaders.values() {
            if !unique.iter().any(|l| Arc::ptr_eq(l, loader)) {
                unique.push(loader.clone());
            }
        }
        unique
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named(&'static str, &'static [&'static str]);

    #[async_trait]
    impl Loader for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn extensions(&self) -> Vec<String> {
            self.1.iter().map(|e| e.to_string()).collect()
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = LoaderRegistry::new();
        registry.register(Arc::new(Named("sass", &[".scss", "SASS"])));

        assert_eq!(registry.lookup("scss").unwrap().name(), "sass");
        assert_eq!(registry.lookup(".SCSS").unwrap().name(), "sass");
        assert_eq!(registry.lookup_path(Path::new("/a/b.Sass")).unwrap().name(), "sass");
        assert!(registry.lookup(".css").is_none());
        assert!(registry.lookup_path(Path::new("/a/Makefile")).is_none());
        assert_eq!(registry.extensions(), vec![".sass".to_string(), ".scss".to_string()]);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = LoaderRegistry::new();
        registry
            .register(Arc::new(Named("first", &[".md"])))
            .register(Arc::new(Named("second", &[".MD"])));

        assert_eq!(registry.lookup(".md").unwrap().name(), "second");
        assert_eq!(registry.loaders().len(), 1);
    }

    #[test]
    fn test_register_as_overrides_declared_extensions() {
        let mut registry = LoaderRegistry::new();
        let loader: Arc<dyn Loader> = Arc::new(Named("text", &[".txt"]));
        registry.register_as([".log", ".out"], loader);

        assert!(registry.lookup(".txt").is_none());
        assert_eq!(registry.lookup(".log").unwrap().name(), "text");
        assert_eq!(registry.loaders().len(), 1);
    }
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Handlers for built server modules.
//!
//! A production build records server-side entry points with
//! [`crate::Target::Server`]. Instead of loading code at request time, the
//! host registers one [`ServerModule`] per artifact at startup, keyed by the
//! artifact's path relative to the build output directory (`api/users.js`).

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::RequestContext;
use crate::response::Response;

/// Request handler of one built server module.
#[async_trait]
pub trait ServerModule: Send + Sync {
    /// Answers a request routed to this module.
    async fn handle(&self, ctx: &RequestContext) -> Result<Response>;
}

struct FnModule<F>(F);

#[async_trait]
impl<F, Fut> ServerModule for FnModule<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn handle(&self, ctx: &RequestContext) -> Result<Response> {
        (self.0)(ctx.clone()).await
    }
}

/// Server modules keyed by artifact path.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn ServerModule>>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` for the artifact at `path` (relative to the output
    /// directory).
    pub fn register(&mut self, path: impl AsRef<Path>, module: Arc<dyn ServerModule>) -> &mut Self {
        self.modules.insert(key(path.as_ref()), module);
        self
    }

    /// Registers an async closure as a module.
    pub fn register_fn<F, Fut>(&mut self, path: impl AsRef<Path>, handler: F) -> &mut Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.register(path, Arc::new(FnModule(handler)))
    }

    /// The module for `path`.
    pub fn get(&self, path: &Path) -> Option<Arc<dyn ServerModule>> {
        self.modules.get(&key(path)).cloned()
    }

    /// Registered artifact keys.
    pub fn keys(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// `/`-separated key without leading `./` or root.
fn key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

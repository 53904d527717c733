// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::path::Path;

use async_trait::async_trait;

use crate::build::{BuildOutput, Target};
use crate::error::Result;
use crate::filename::FilenameParser;
use crate::loader::{BuildingLoader, Loader, ServingLoader};
use crate::request::RequestContext;
use crate::response::Response;
use crate::router::normalize_extension;

/// Serves files unchanged and copies them into builds as assets.
///
/// Registered by the pipeline for `static_files` before any user loader, so
/// a user loader for the same extension takes precedence.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    extensions: Vec<String>,
}

impl StaticLoader {
    /// Creates a static loader for `extensions`.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
        }
    }
}

#[async_trait]
impl Loader for StaticLoader {
    fn name(&self) -> &str {
        "static"
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn serving(&self) -> Option<&dyn ServingLoader> {
        Some(self)
    }

    fn building(&self) -> Option<&dyn BuildingLoader> {
        Some(self)
    }
}

#[async_trait]
impl ServingLoader for StaticLoader {
    async fn handle(&self, file: &Path, _ctx: &RequestContext) -> Result<Response> {
        let body = tokio::fs::read(file).await?;
        Ok(Response::file(file, body))
    }

    // The source already is the artifact.
    fn should_cache(&self, _file: &Path, _ctx: &RequestContext, _response: &Response) -> bool {
        false
    }
}

#[async_trait]
impl BuildingLoader for StaticLoader {
    async fn build(&self, file: &Path, names: &FilenameParser) -> Result<Vec<BuildOutput>> {
        let content = tokio::fs::read(file).await?;
        Ok(vec![BuildOutput::new(names.parse("[name][ext]"), Target::Asset, content)])
    }
}

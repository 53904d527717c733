// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The loader capability contract.
//!
//! A [`Loader`] is registered for one or more file extensions and exposes up
//! to two capabilities:
//!
//! - [`ServingLoader`]: answers a live request for a matched file
//! - [`BuildingLoader`]: turns a file into build outputs ahead of time
//!
//! Which capabilities a loader has is checked when a route is dispatched, not
//! when the loader is registered. A loader exposing neither yields a
//! configuration error for every route it is asked to answer.

use std::path::Path;

use async_trait::async_trait;

use crate::build::BuildOutput;
use crate::error::Result;
use crate::filename::FilenameParser;
use crate::options::PipelineOptions;
use crate::request::RequestContext;
use crate::response::Response;

/// Methods a serving loader accepts unless it says otherwise.
pub const DEFAULT_METHODS: &[&str] = &["GET", "HEAD"];

/// A per-extension transform unit.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Extensions this loader handles, e.g. `[".scss"]`.
    fn extensions(&self) -> Vec<String>;

    /// One-time initialization, run by [`crate::Pipeline::setup`] before the
    /// first request or build.
    async fn setup(&self, _options: &PipelineOptions) -> Result<()> {
        Ok(())
    }

    /// The live serving capability, if any.
    fn serving(&self) -> Option<&dyn ServingLoader> {
        None
    }

    /// The ahead-of-time build capability, if any.
    fn building(&self) -> Option<&dyn BuildingLoader> {
        None
    }
}

/// Produces a response for a matched file on demand.
#[async_trait]
pub trait ServingLoader: Send + Sync {
    /// Transforms `file` for this request.
    async fn handle(&self, file: &Path, ctx: &RequestContext) -> Result<Response>;

    /// Upper-case HTTP methods this loader answers; others get a 405.
    fn methods(&self) -> &[&str] {
        DEFAULT_METHODS
    }

    /// Whether this response may be stored and replayed for later requests.
    ///
    /// Only consulted for GET requests to routes without dynamic parameters,
    /// since one cache entry exists per source file.
    fn should_cache(&self, _file: &Path, ctx: &RequestContext, response: &Response) -> bool {
        ctx.params.is_empty() && response.is_success()
    }
}

/// Produces build outputs for a file.
#[async_trait]
pub trait BuildingLoader: Send + Sync {
    /// Transforms `file`; `names` derives output filenames.
    async fn build(&self, file: &Path, names: &FilenameParser) -> Result<Vec<BuildOutput>>;
}

/// Returns true if `loader` answers `method`.
pub(crate) fn accepts(loader: &dyn ServingLoader, method: &str) -> bool {
    loader.methods().iter().any(|m| m.eq_ignore_ascii_case(method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::router::Route;

    struct Echo;

    #[async_trait]
    impl ServingLoader for Echo {
        async fn handle(&self, file: &Path, _ctx: &RequestContext) -> Result<Response> {
            Ok(Response::ok(file.to_string_lossy().into_owned()))
        }
    }

    #[async_trait]
    impl Loader for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn extensions(&self) -> Vec<String> {
            vec![".txt".into()]
        }

        fn serving(&self) -> Option<&dyn ServingLoader> {
            Some(self)
        }
    }

    fn ctx(params: Vec<(String, String)>) -> RequestContext {
        RequestContext {
            request: Request::get("/a"),
            route: Route {
                matcher: "/a".into(),
                file_path: "/app/a.txt".into(),
            },
            params,
        }
    }

    #[tokio::test]
    async fn test_capabilities() {
        let loader = Echo;
        assert!(loader.building().is_none());

        let serving = loader.serving().unwrap();
        let resp = serving.handle(Path::new("/app/a.txt"), &ctx(vec![])).await.unwrap();
        assert_eq!(resp.text(), "/app/a.txt");
        assert!(accepts(serving, "get"));
        assert!(!accepts(serving, "POST"));
    }

    #[test]
    fn test_should_cache_default() {
        let ok = Response::ok("x");
        assert!(Echo.should_cache(Path::new("/a"), &ctx(vec![]), &ok));
        assert!(!Echo.should_cache(Path::new("/a"), &ctx(vec![("id".into(), "1".into())]), &ok));
        assert!(!Echo.should_cache(Path::new("/a"), &ctx(vec![]), &Response::empty(500)));
    }
}

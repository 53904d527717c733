// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The pipeline context object.
//!
//! A [`Pipeline`] owns the router, loader registry, content cache, middleware
//! channels and event emitter of one site. It is cheap to clone and safe to
//! share across tasks; several independent pipelines can live in one process.
//!
//! # Request flow
//!
//! 1. `request` channel; a response here answers the request
//! 2. route match; no match runs `notFound` (default: empty 404)
//! 3. dispatch: loader (live) or manifest lookup (production)
//! 4. `response` channel; may replace the response
//! 5. `end` channel; may override the outgoing response
//!
//! Errors from any step go to the `error` channel. If no handler answers,
//! [`Pipeline::handle`] returns [`KilnError::Unhandled`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use crate::build::{BuildOrchestrator, Bundler, CopyBundler, Target};
use crate::cache::{ContentCache, Watch};
use crate::channel::{ErrorPayload, Middlewares, RequestPayload, ResponsePayload};
use crate::error::{KilnError, Result};
use crate::events::{Event, EventEmitter, EventKind, Flow, ListenerId, WatchKind};
use crate::filename::FilenameParser;
use crate::loader::{accepts, BuildingLoader, Loader, ServingLoader};
use crate::loaders::StaticLoader;
use crate::manifest::Manifest;
use crate::modules::{ModuleRegistry, ServerModule};
use crate::options::PipelineOptions;
use crate::registry::LoaderRegistry;
use crate::request::{Request, RequestContext};
use crate::response::Response;
use crate::router::{Route, Router};

enum Mode {
    /// Transform sources on demand through loaders.
    Live,
    /// Serve the artifacts of a previous build.
    Manifest(Manifest),
}

struct Inner {
    options: PipelineOptions,
    router: RwLock<Router>,
    registry: LoaderRegistry,
    cache: ContentCache,
    middlewares: Middlewares,
    events: Arc<EventEmitter>,
    modules: ModuleRegistry,
    bundler: Arc<dyn Bundler>,
    mode: Mode,
    ready: AtomicBool,
    watch_listener: Mutex<Option<ListenerId>>,
}

/// A configured content pipeline.
///
/// # Example
///
/// ```rust,no_run
/// use kiln::{Pipeline, PipelineOptions, Request};
///
/// # async fn run() -> kiln::Result<()> {
/// let pipeline = Pipeline::builder(PipelineOptions::default()).build()?;
/// pipeline.setup().await?;
///
/// let response = pipeline.handle(Request::get("/")).await?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("dir", &self.inner.options.dir)
            .field("production", &self.is_production())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// Configures and creates a [`Pipeline`].
pub struct PipelineBuilder {
    options: PipelineOptions,
    loaders: Vec<(Option<Vec<String>>, Arc<dyn Loader>)>,
    bundler: Arc<dyn Bundler>,
    events: Option<Arc<EventEmitter>>,
    modules: ModuleRegistry,
    manifest: Option<Manifest>,
}

impl PipelineBuilder {
    /// Adds a loader for the extensions it declares.
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loaders.push((None, loader));
        self
    }

    /// Adds a loader for explicit extensions.
    pub fn loader_as<I, S>(mut self, extensions: I, loader: Arc<dyn Loader>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions = extensions.into_iter().map(Into::into).collect();
        self.loaders.push((Some(extensions), loader));
        self
    }

    /// Replaces the bundler used by [`Pipeline::build`].
    pub fn bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    /// Shares an existing event emitter.
    pub fn events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    /// Registers the handler of a built server module.
    pub fn module(mut self, path: impl AsRef<Path>, module: Arc<dyn ServerModule>) -> Self {
        self.modules.register(path, module);
        self
    }

    /// Replaces the server module registry.
    pub fn modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    /// Serves the artifacts recorded in `manifest` from `options.out_dir`
    /// instead of running loaders.
    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Discovers routes and assembles the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let mut options = self.options;
        let events = self.events.unwrap_or_default();

        let mut registry = LoaderRegistry::new();
        if !options.static_files.is_empty() {
            let statics = StaticLoader::new(options.static_files.clone());
            registry.register(Arc::new(statics));
        }
        for (extensions, loader) in self.loaders {
            match extensions {
                Some(extensions) => registry.register_as(extensions, loader),
                None => registry.register(loader),
            };
        }

        let (router, mode) = match self.manifest {
            Some(manifest) => {
                options.dev = false;
                let router = Router::discover(&options.out_dir, manifest.extensions.iter())?;
                (router, Mode::Manifest(manifest))
            }
            // Every file is routable; files without a loader are served raw.
            None => (Router::discover(&options.dir, Vec::<String>::new())?, Mode::Live),
        };

        let cache = ContentCache::new(&options.cache, &options.dir, options.dev, events.clone())
            .with_debounce(options.watch_debounce);

        debug!(
            root = %router.root().display(),
            routes = router.routes().len(),
            loaders = ?registry,
            "pipeline created"
        );

        Ok(Pipeline {
            inner: Arc::new(Inner {
                options,
                router: RwLock::new(router),
                registry,
                cache,
                middlewares: Middlewares::new(),
                events,
                modules: self.modules,
                bundler: self.bundler,
                mode,
                ready: AtomicBool::new(false),
                watch_listener: Mutex::new(None),
            }),
        })
    }
}

impl Pipeline {
    /// Starts configuring a pipeline.
    pub fn builder(options: PipelineOptions) -> PipelineBuilder {
        PipelineBuilder {
            options,
            loaders: Vec::new(),
            bundler: Arc::new(CopyBundler),
            events: None,
            modules: ModuleRegistry::new(),
            manifest: None,
        }
    }

    /// Prepares the cache, runs every loader's setup and emits `init`.
    ///
    /// Must complete before [`Pipeline::handle`] or [`Pipeline::build`].
    /// Calling it again is a no-op.
    pub async fn setup(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        if matches!(self.inner.mode, Mode::Live) {
            self.inner.cache.setup().await?;
            for loader in self.inner.registry.loaders() {
                trace!(loader = loader.name(), "loader setup");
                loader.setup(&self.inner.options).await?;
            }

            if self.inner.options.dev {
                let id = self.watch_sources();
                *self
                    .inner
                    .watch_listener
                    .lock()
                    .map_err(|_| KilnError::Poisoned("pipeline listener"))? = Some(id);
            }
        }

        self.inner.ready.store(true, Ordering::SeqCst);
        self.inner.events.emit(Event::Init).await;
        info!(
            dir = %self.inner.options.dir.display(),
            production = self.is_production(),
            "pipeline ready"
        );
        Ok(())
    }

    /// Answers one request.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        if !self.is_ready() {
            return Err(KilnError::NotReady);
        }

        let started = Instant::now();
        let response = match self.process(&request).await {
            Ok(response) => response,
            Err(error) => self.recover(&request, error).await?,
        };

        let response = match self.finish(&request, response).await {
            Ok(response) => response,
            Err(error) => self.recover(&request, error).await?,
        };

        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            elapsed = ?started.elapsed(),
            "request"
        );
        Ok(response)
    }

    /// Builds every route into the output directory and saves a manifest.
    pub async fn build(&self) -> Result<Manifest> {
        if !self.is_ready() {
            return Err(KilnError::NotReady);
        }
        if self.is_production() {
            return Err(KilnError::config(
                &self.inner.options.out_dir,
                "a pipeline serving a manifest cannot build",
            ));
        }

        let routes = self.routes().await;
        let orchestrator = BuildOrchestrator::new(
            &self.inner.options,
            self.inner.bundler.clone(),
            self.inner.events.clone(),
        );
        orchestrator.build(&routes, &self.inner.registry).await
    }

    /// Rescans the routes directory and drops every cache entry.
    ///
    /// Router table and cache are rebuilt together under the router lock, so
    /// no request sees one without the other.
    pub async fn reload(&self) -> Result<()> {
        {
            let mut router = self.inner.router.write().await;
            router.reload()?;
            if matches!(self.inner.mode, Mode::Live) && self.is_ready() {
                self.inner.cache.reset().await?;
            }
            info!(routes = router.routes().len(), "routes reloaded");
        }
        self.inner.events.emit(Event::Reload).await;
        Ok(())
    }

    /// Stops the watcher and emits `shutdown`.
    pub async fn shutdown(&self) {
        if let Ok(mut listener) = self.inner.watch_listener.lock() {
            if let Some(id) = listener.take() {
                self.inner.events.off(EventKind::WatchChange, id);
            }
        }
        self.inner.cache.shutdown();
        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.events.emit(Event::Shutdown).await;
    }

    /// Request-time middleware channels.
    pub fn middlewares(&self) -> &Middlewares {
        &self.inner.middlewares
    }

    /// Lifecycle event emitter.
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.inner.events
    }

    /// The content cache.
    pub fn cache(&self) -> &ContentCache {
        &self.inner.cache
    }

    /// The loader registry.
    pub fn registry(&self) -> &LoaderRegistry {
        &self.inner.registry
    }

    /// Pipeline options.
    pub fn options(&self) -> &PipelineOptions {
        &self.inner.options
    }

    /// The manifest being served, in production mode.
    pub fn manifest(&self) -> Option<&Manifest> {
        match &self.inner.mode {
            Mode::Manifest(manifest) => Some(manifest),
            Mode::Live => None,
        }
    }

    /// Snapshot of the current route table.
    pub async fn routes(&self) -> Vec<Route> {
        self.inner.router.read().await.routes().to_vec()
    }

    /// Returns true once `setup` has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Returns true when serving a manifest.
    pub fn is_production(&self) -> bool {
        matches!(self.inner.mode, Mode::Manifest(_))
    }

    fn watch_sources(&self) -> ListenerId {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.events.on(EventKind::WatchChange, move |event| {
            let weak = weak.clone();
            async move {
                let Event::WatchChange { kind, original, .. } = event else {
                    return Flow::Continue;
                };
                if matches!(kind, WatchKind::Add | WatchKind::Unlink) {
                    if let Some(inner) = weak.upgrade() {
                        debug!(?kind, file = %original.display(), "route table changed");
                        if let Err(e) = (Pipeline { inner }).reload().await {
                            warn!("reload failed: {}", e);
                        }
                    }
                }
                Flow::Continue
            }
        })
    }

    async fn process(&self, request: &Request) -> Result<Response> {
        let middlewares = &self.inner.middlewares;
        let payload = RequestPayload {
            request: request.clone(),
        };
        if let Some(response) = middlewares.request.call(payload.clone()).await? {
            return Ok(response);
        }

        let matched = self.inner.router.read().await.match_url(&request.path);
        let Some(matched) = matched else {
            trace!(path = %request.path, "no route");
            return Ok(middlewares
                .not_found
                .call(payload)
                .await?
                .unwrap_or_else(Response::not_found));
        };

        let ctx = RequestContext {
            request: request.clone(),
            route: matched.route,
            params: matched.params,
        };
        let response = match &self.inner.mode {
            Mode::Live => self.dispatch(&ctx).await?,
            Mode::Manifest(manifest) => self.serve_manifest(manifest, &ctx).await?,
        };

        let payload = ResponsePayload {
            request: request.clone(),
            response,
        };
        match middlewares.response.call(payload.clone()).await? {
            Some(response) => Ok(response),
            None => Ok(payload.response),
        }
    }

    async fn finish(&self, request: &Request, response: Response) -> Result<Response> {
        let payload = ResponsePayload {
            request: request.clone(),
            response,
        };
        match self.inner.middlewares.end.call(payload.clone()).await? {
            Some(response) => Ok(response),
            None => Ok(payload.response),
        }
    }

    async fn recover(&self, request: &Request, error: KilnError) -> Result<Response> {
        let error = Arc::new(error);
        debug!(path = %request.path, "request failed: {}", error);

        let payload = ErrorPayload {
            request: request.clone(),
            error: error.clone(),
        };
        match self.inner.middlewares.error.call(payload).await? {
            Some(response) => Ok(response),
            None => Err(KilnError::Unhandled(error)),
        }
    }

    /// Live dispatch of a matched route.
    async fn dispatch(&self, ctx: &RequestContext) -> Result<Response> {
        let file = ctx.file();
        let Some(loader) = self.inner.registry.lookup_path(file) else {
            return passthrough(ctx).await;
        };

        if let Some(serving) = loader.serving() {
            return self.serve(serving, ctx).await;
        }
        if let Some(building) = loader.building() {
            return self.serve_built(loader.name(), building, ctx).await;
        }

        warn!(loader = loader.name(), file = %file.display(), "loader can neither serve nor build");
        Ok(Response::config_error(format!(
            "loader '{}' for '{}' can neither serve nor build",
            loader.name(),
            file.display()
        )))
    }

    async fn serve(&self, serving: &dyn ServingLoader, ctx: &RequestContext) -> Result<Response> {
        if !accepts(serving, &ctx.request.method) {
            return Ok(Response::method_not_allowed());
        }

        let file = ctx.file();
        // Entries are keyed by source file, so only reads of static routes
        // may share one.
        if !ctx.request.is_read() || !ctx.params.is_empty() {
            return serving.handle(file, ctx).await;
        }

        let cache = &self.inner.cache;
        let _guard = cache.lock_key(file).await?;
        if let Some(response) = cache.response(file).await? {
            trace!(file = %file.display(), "cache hit");
            return Ok(response);
        }

        let response = serving.handle(file, ctx).await?;
        // A HEAD answer may carry no body; only GET fills the cache.
        if ctx.request.method == "GET" && serving.should_cache(file, ctx, &response) {
            cache.write_response(file, &response, Watch::Source).await?;
        }
        Ok(response)
    }

    /// Serves a build-only loader in live mode by building the file on
    /// demand and answering with its first browser or asset output.
    async fn serve_built(&self, name: &str, building: &dyn BuildingLoader, ctx: &RequestContext) -> Result<Response> {
        if !ctx.request.is_read() {
            return Ok(Response::method_not_allowed());
        }

        let file = ctx.file();
        let cache = &self.inner.cache;
        let _guard = cache.lock_key(file).await?;
        if let Some(response) = cache.response(file).await? {
            return Ok(response);
        }

        let outputs = building.build(file, &FilenameParser::new(file)).await?;
        let Some(output) = outputs
            .into_iter()
            .find(|o| matches!(o.target, Target::Browser | Target::Asset))
        else {
            return Ok(Response::config_error(format!(
                "loader '{}' has no browser or asset output for '{}'",
                name,
                file.display()
            )));
        };

        let response = Response::file(&output.filename, output.content);
        cache.write_response(file, &response, Watch::Source).await?;
        Ok(response)
    }

    async fn serve_manifest(&self, manifest: &Manifest, ctx: &RequestContext) -> Result<Response> {
        let file = ctx.file();
        let Some(kind) = manifest.kind_of(file) else {
            warn!(file = %file.display(), "route is not in the manifest");
            return Ok(Response::config_error(format!(
                "'{}' is not declared in the manifest",
                file.display()
            )));
        };

        match kind {
            Target::Asset | Target::Browser => passthrough(ctx).await,
            Target::Server => {
                let out_dir = self.inner.router.read().await.root().to_path_buf();
                let relative = file.strip_prefix(&out_dir).unwrap_or(file);
                match self.inner.modules.get(relative) {
                    Some(module) => module.handle(ctx).await,
                    None => Ok(Response::config_error(format!(
                        "no server module is registered for '{}'",
                        relative.display()
                    ))),
                }
            }
            Target::Unknown => Ok(Response::config_error(format!(
                "'{}' has an unrecognized kind in the manifest",
                file.display()
            ))),
        }
    }
}

/// Serves a matched file's bytes unchanged.
async fn passthrough(ctx: &RequestContext) -> Result<Response> {
    if !ctx.request.is_read() {
        return Ok(Response::method_not_allowed());
    }
    let file: &PathBuf = ctx.file();
    match tokio::fs::read(file).await {
        Ok(body) => Ok(Response::file(file, body)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Response::not_found()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Outcome;
    use crate::options::CacheOptions;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;

    struct Nothing;

    #[async_trait]
    impl Loader for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn extensions(&self) -> Vec<String> {
            vec![".void".into()]
        }
    }

    struct Shout;

    #[async_trait]
    impl ServingLoader for Shout {
        async fn handle(&self, file: &Path, _ctx: &RequestContext) -> Result<Response> {
            let text = tokio::fs::read_to_string(file).await?;
            Ok(Response::ok(text.to_uppercase()).with_header("content-type", "text/plain"))
        }

        fn methods(&self) -> &[&str] {
            &["GET"]
        }
    }

    #[async_trait]
    impl Loader for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn extensions(&self) -> Vec<String> {
            vec![".shout".into()]
        }

        fn serving(&self) -> Option<&dyn ServingLoader> {
            Some(self)
        }
    }

    fn options(dir: &Path) -> PipelineOptions {
        PipelineOptions {
            dir: dir.join("app"),
            dev: false,
            cache: CacheOptions {
                root: Some(dir.join(".cache")),
                preserve: None,
            },
            out_dir: dir.join("dist"),
            ..Default::default()
        }
    }

    async fn pipeline(dir: &Path) -> Pipeline {
        fs::create_dir_all(dir.join("app")).unwrap();
        fs::write(dir.join("app/hello.shout"), "hello").unwrap();
        fs::write(dir.join("app/empty.void"), "").unwrap();
        fs::write(dir.join("app/data.json"), "{}").unwrap();

        let pipeline = Pipeline::builder(options(dir))
            .loader(Arc::new(Shout))
            .loader(Arc::new(Nothing))
            .build()
            .unwrap();
        pipeline.setup().await.unwrap();
        pipeline
    }

    #[tokio::test]
    async fn test_requires_setup() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        let pipeline = Pipeline::builder(options(dir.path())).build().unwrap();
        assert!(matches!(pipeline.handle(Request::get("/")).await, Err(KilnError::NotReady)));
    }

    #[tokio::test]
    async fn test_serving_loader_and_method_gate() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let resp = pipeline.handle(Request::get("/hello")).await.unwrap();
        assert_eq!(resp.text(), "HELLO");

        let resp = pipeline.handle(Request::new("POST", "/hello")).await.unwrap();
        assert_eq!(resp.status, 405);
    }

    #[tokio::test]
    async fn test_passthrough_and_not_found() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let resp = pipeline.handle(Request::get("/data")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type(), Some("application/json"));

        let resp = pipeline.handle(Request::get("/nope")).await.unwrap();
        assert_eq!(resp.status, 404);
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn test_loader_without_capabilities_is_config_error() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let resp = pipeline.handle(Request::get("/empty")).await.unwrap();
        assert_eq!(resp.status, 500);
        assert!(resp.status_text.unwrap().contains("nothing"));
    }

    #[tokio::test]
    async fn test_error_channel_recovers_or_rethrows() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        pipeline
            .middlewares()
            .request
            .add("explode", |_| async { Err(KilnError::NotReady) })
            .unwrap();

        let err = pipeline.handle(Request::get("/hello")).await.unwrap_err();
        assert!(matches!(err, KilnError::Unhandled(ref inner) if matches!(**inner, KilnError::NotReady)));

        pipeline
            .middlewares()
            .error
            .add("recover", |payload: ErrorPayload| async move {
                Ok(Outcome::Respond(Response::new(503, payload.error.to_string())))
            })
            .unwrap();
        let resp = pipeline.handle(Request::get("/hello")).await.unwrap();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.text(), "run setup first");
    }

    #[tokio::test]
    async fn test_end_channel_overrides_response() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        pipeline
            .middlewares()
            .end
            .add("stamp", |payload: ResponsePayload| async move {
                Ok(Outcome::Respond(payload.response.with_header("x-end", "1")))
            })
            .unwrap();

        let resp = pipeline.handle(Request::get("/nope")).await.unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.header("x-end"), Some("1"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_routes_and_emits() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let reloaded = Arc::new(AtomicBool::new(false));
        let r = reloaded.clone();
        pipeline.events().once(EventKind::Reload, move |_| {
            let r = r.clone();
            async move {
                r.store(true, Ordering::SeqCst);
                Flow::Continue
            }
        });

        fs::write(dir.path().join("app/new.shout"), "new").unwrap();
        assert_eq!(pipeline.handle(Request::get("/new")).await.unwrap().status, 404);

        pipeline.reload().await.unwrap();
        assert_eq!(pipeline.handle(Request::get("/new")).await.unwrap().text(), "NEW");
        assert!(reloaded.load(Ordering::SeqCst));
    }
}

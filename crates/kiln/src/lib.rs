// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// KilnError carries paths and bundler logs for diagnostics.
#![allow(clippy::result_large_err)]

//! # kiln
//!
//! Filesystem-routed content pipeline.
//!
//! kiln matches a URL to a file under a routes directory, transforms that
//! file through the loader registered for its extension, and either serves
//! the result live (with a disk cache invalidated by a file watcher) or
//! builds every route ahead of time into an output directory described by a
//! [`Manifest`].
//!
//! ## Features
//!
//! - Next.js-style file routing (`blog/[slug].md` -> `/blog/{slug}`)
//! - Pluggable loaders with serve and build capabilities
//! - Disk cache with watch-based invalidation and single-flight transforms
//! - Short-circuiting middleware channels and lifecycle events
//! - Per-target bundling and manifest-driven production serving
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kiln::{Pipeline, PipelineOptions, Request};
//!
//! let pipeline = Pipeline::builder(PipelineOptions::default())
//!     .loader(Arc::new(MarkdownLoader::default()))
//!     .build()?;
//! pipeline.setup().await?;
//!
//! let response = pipeline.handle(Request::get("/blog/hello")).await?;
//! ```

/// Ahead-of-time builds and bundler seam.
pub mod build;
/// Disk-backed content cache.
pub mod cache;
/// Middleware channels.
pub mod channel;
/// Error types.
pub mod error;
/// Lifecycle events.
pub mod events;
/// Output filename patterns.
pub mod filename;
/// The loader capability contract.
pub mod loader;
/// Built-in loaders.
pub mod loaders;
/// Build manifest.
pub mod manifest;
/// Built-in middlewares.
pub mod middlewares;
/// Server module handlers for production serving.
pub mod modules;
/// Pipeline and cache options.
pub mod options;
/// The pipeline context object.
pub mod pipeline;
/// Extension-keyed loader registry.
pub mod registry;
/// Transport-independent request.
pub mod request;
/// Transport-independent response.
pub mod response;
/// File-based routing.
pub mod router;

pub use build::{BuildOrchestrator, BuildOutput, Bundler, CopyBundler, Target};
pub use cache::{CacheLookup, ContentCache, Watch};
pub use channel::{MiddlewareChannel, Middlewares, Outcome};
pub use error::{ChannelError, KilnError, Result};
pub use events::{Event, EventEmitter, EventKind, Flow, WatchKind};
pub use filename::FilenameParser;
pub use loader::{BuildingLoader, Loader, ServingLoader};
pub use manifest::Manifest;
pub use modules::{ModuleRegistry, ServerModule};
pub use options::{CacheOptions, PipelineOptions};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use registry::LoaderRegistry;
pub use request::{Request, RequestContext};
pub use response::Response;
pub use router::{Route, Router};

/// Re-exported so loaders can implement the traits without a direct
/// dependency.
pub use async_trait::async_trait;

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Ahead-of-time builds.
//!
//! [`BuildOrchestrator::build`] walks the route table once, sequentially:
//!
//! 1. The output directory is cleared.
//! 2. Every routed file goes through its loader's build capability. Files
//!    without a loader are copied as-is and recorded as assets. Asset
//!    outputs are written straight into the output directory; server and
//!    browser outputs are staged in a private build cache.
//! 3. Each non-empty target batch goes through the [`Bundler`] exactly once.
//! 4. Entry-point artifacts are recorded in the [`Manifest`].
//! 5. The manifest is saved only after every target succeeded.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{absolute, ContentCache, Watch};
use crate::error::{BuildLogs, KilnError, Result};
use crate::events::EventEmitter;
use crate::filename::FilenameParser;
use crate::manifest::Manifest;
use crate::options::{CacheOptions, PipelineOptions};
use crate::registry::LoaderRegistry;
use crate::router::Route;

/// Runtime an artifact is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Server-side module, answered by a registered handler.
    Server,
    /// Client-side bundle, served as a file.
    Browser,
    /// Static file, served as-is.
    Asset,
    /// Anything else found in a manifest.
    #[serde(other)]
    Unknown,
}

impl Target {
    /// Lower-case name, as stored in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Server => "server",
            Target::Browser => "browser",
            Target::Asset => "asset",
            Target::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file produced by a loader's build capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Output name, relative to the source file's directory. An absolute
    /// path must lie inside the routes directory.
    pub filename: PathBuf,
    /// Where the output goes.
    pub target: Target,
    /// Output bytes.
    pub content: Vec<u8>,
    /// Module specifiers the bundler must leave unresolved.
    pub externals: Vec<String>,
}

impl BuildOutput {
    /// Creates an output with no externals.
    pub fn new(filename: impl Into<PathBuf>, target: Target, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            target,
            content: content.into(),
            externals: Vec::new(),
        }
    }

    /// Adds externals.
    pub fn with_externals<I, S>(mut self, externals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.externals.extend(externals.into_iter().map(Into::into));
        self
    }
}

/// Output naming handed to the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleNaming {
    /// Entry-point pattern.
    pub entry: String,
    /// Shared chunk pattern.
    pub chunk: String,
}

impl BundleNaming {
    /// Naming for `target`. Server chunks are dot-prefixed so the router
    /// never exposes them.
    pub fn for_target(target: Target) -> Self {
        match target {
            Target::Server => Self {
                entry: "[dir]/[name].[ext]".into(),
                chunk: ".module-[name]-[hash].[ext]".into(),
            },
            _ => Self {
                entry: "[dir]/[name].[ext]".into(),
                chunk: "chunk-[name]-[hash].[ext]".into(),
            },
        }
    }
}

/// One bundler invocation: every staged entry of one target.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Target being bundled.
    pub target: Target,
    /// Staged entry files.
    pub entrypoints: Vec<PathBuf>,
    /// Directory the entry layout is relative to.
    pub root: PathBuf,
    /// Where artifacts go; entries keep their path relative to `root`.
    pub out_dir: PathBuf,
    /// Output naming.
    pub naming: BundleNaming,
    /// Union of the entries' externals.
    pub externals: Vec<String>,
}

/// Whether an artifact is an entry point or a shared chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Top-level output of one entry.
    EntryPoint,
    /// Code shared between entries.
    Chunk,
}

/// A file written by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    /// Path of the artifact, absolute or relative to the output directory.
    pub path: PathBuf,
    /// Kind of artifact.
    pub kind: ArtifactKind,
}

/// Result of one bundler invocation.
#[derive(Debug, Clone, Default)]
pub struct BundleReport {
    /// False if the target failed.
    pub success: bool,
    /// Diagnostics, in order.
    pub logs: Vec<String>,
    /// Written artifacts.
    pub artifacts: Vec<BundleArtifact>,
    /// Staged entry the failure is attributed to, if known.
    pub failed_entry: Option<PathBuf>,
}

/// The bundler behind a build.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundles every entry of one target.
    async fn bundle(&self, request: BundleRequest) -> Result<BundleReport>;
}

/// Copies every entry unchanged into the output directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyBundler;

#[async_trait]
impl Bundler for CopyBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<BundleReport> {
        let mut report = BundleReport {
            success: true,
            ..Default::default()
        };

        for entry in &request.entrypoints {
            let relative = match entry.strip_prefix(&request.root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => PathBuf::from(entry.file_name().unwrap_or_default()),
            };
            let dest = request.out_dir.join(relative);

            let copied = match dest.parent() {
                Some(parent) => tokio::fs::create_dir_all(parent).await,
                None => Ok(()),
            };
            let copied = match copied {
                Ok(()) => tokio::fs::copy(entry, &dest).await.map(|_| ()),
                Err(e) => Err(e),
            };

            if let Err(e) = copied {
                report.success = false;
                report.logs.push(format!("{}: {}", entry.display(), e));
                report.failed_entry.get_or_insert_with(|| entry.clone());
                continue;
            }

            report.artifacts.push(BundleArtifact {
                path: dest,
                kind: ArtifactKind::EntryPoint,
            });
        }

        Ok(report)
    }
}

struct Staged {
    entries: Vec<PathBuf>,
    externals: Vec<String>,
}

/// Drives a full build from the route table to a saved manifest.
pub struct BuildOrchestrator {
    root: PathBuf,
    out_dir: PathBuf,
    staging: CacheOptions,
    bundler: Arc<dyn Bundler>,
    events: Arc<EventEmitter>,
}

impl fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("root", &self.root)
            .field("out_dir", &self.out_dir)
            .finish()
    }
}

impl BuildOrchestrator {
    /// Creates an orchestrator for the routes directory of `options`.
    pub fn new(options: &PipelineOptions, bundler: Arc<dyn Bundler>, events: Arc<EventEmitter>) -> Self {
        let root = std::fs::canonicalize(&options.dir).unwrap_or_else(|_| absolute(&options.dir));
        Self {
            root,
            out_dir: absolute(&options.out_dir),
            staging: CacheOptions {
                root: Some(options.cache.root().join("build")),
                preserve: Some(false),
            },
            bundler,
            events,
        }
    }

    /// The output directory.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Builds every route and saves the manifest.
    ///
    /// Any failure aborts the build before the manifest is written.
    pub async fn build(&self, routes: &[Route], registry: &LoaderRegistry) -> Result<Manifest> {
        let started = Instant::now();

        match tokio::fs::remove_dir_all(&self.out_dir).await {
            Ok(()) => debug!(out_dir = %self.out_dir.display(), "cleared build output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.out_dir).await?;
        // Manifest keys must match the paths the production router scans.
        let out_dir = tokio::fs::canonicalize(&self.out_dir).await?;

        let staging = ContentCache::new(&self.staging, &self.root, false, self.events.clone());
        staging.setup().await?;

        let mut manifest = Manifest::new();
        let mut batches: HashMap<Target, Staged> = HashMap::new();
        // staged entry -> source file, for naming failures
        let mut sources: HashMap<PathBuf, PathBuf> = HashMap::new();

        info!(routes = routes.len(), "building routes");
        for route in routes {
            let file = &route.file_path;
            let Some(loader) = registry.lookup_path(file) else {
                let dest = self.out_path(&out_dir, file, Path::new(""))?;
                copy_file(file, &dest).await?;
                manifest.insert(&dest, Target::Asset);
                debug!(file = %file.display(), "copied as asset");
                continue;
            };

            let Some(building) = loader.building() else {
                return Err(KilnError::config(
                    file,
                    format!("loader '{}' cannot build this file", loader.name()),
                ));
            };

            let outputs = building.build(file, &FilenameParser::new(file)).await?;
            debug!(file = %file.display(), loader = loader.name(), outputs = outputs.len(), "built");

            for output in outputs {
                let dest = self.out_path(&out_dir, file, &output.filename)?;
                match output.target {
                    Target::Asset => {
                        if let Some(parent) = dest.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::write(&dest, &output.content).await?;
                        manifest.insert(&dest, Target::Asset);
                    }
                    Target::Server | Target::Browser => {
                        let staged = staging.write(&dest, &output.content, Watch::Off).await?;
                        sources.insert(staged.clone(), file.clone());
                        let batch = batches.entry(output.target).or_insert_with(|| Staged {
                            entries: Vec::new(),
                            externals: Vec::new(),
                        });
                        batch.entries.push(staged);
                        for external in output.externals {
                            if !batch.externals.contains(&external) {
                                batch.externals.push(external);
                            }
                        }
                    }
                    Target::Unknown => {
                        return Err(KilnError::config(
                            file,
                            format!("loader '{}' produced an output with an unknown target", loader.name()),
                        ));
                    }
                }
            }
        }

        for target in [Target::Browser, Target::Server] {
            let Some(batch) = batches.remove(&target) else {
                continue;
            };

            info!(%target, entries = batch.entries.len(), "bundling");
            let report = self
                .bundler
                .bundle(BundleRequest {
                    target,
                    entrypoints: batch.entries,
                    root: staging.resolve(&out_dir),
                    out_dir: out_dir.clone(),
                    naming: BundleNaming::for_target(target),
                    externals: batch.externals,
                })
                .await?;

            if !report.success {
                let file = report
                    .failed_entry
                    .map(|staged| sources.get(&staged).cloned().unwrap_or(staged));
                return Err(KilnError::Build {
                    target,
                    file,
                    logs: BuildLogs(report.logs),
                });
            }
            for line in &report.logs {
                debug!(%target, "{}", line);
            }

            for artifact in report.artifacts {
                if artifact.kind == ArtifactKind::EntryPoint {
                    manifest.insert(&out_dir.join(&artifact.path), target);
                }
            }
        }

        staging.shutdown();
        let path = manifest.save(&out_dir).await?;
        info!(
            files = manifest.files.len(),
            manifest = %path.display(),
            elapsed = ?started.elapsed(),
            "build finished"
        );
        Ok(manifest)
    }

    /// Output location of `filename` produced for `source`.
    fn out_path(&self, out_dir: &Path, source: &Path, filename: &Path) -> Result<PathBuf> {
        let relative_file = if filename.is_absolute() {
            absolute(filename)
                .strip_prefix(&self.root)
                .map(Path::to_path_buf)
                .map_err(|_| {
                    KilnError::config(
                        source,
                        format!("output '{}' is outside the routes directory", filename.display()),
                    )
                })?
        } else {
            let dir = source
                .parent()
                .and_then(|p| p.strip_prefix(&self.root).ok())
                .unwrap_or_else(|| Path::new(""));
            if filename.as_os_str().is_empty() {
                dir.join(source.file_name().unwrap_or_default())
            } else {
                dir.join(filename)
            }
        };
        Ok(absolute(&out_dir.join(relative_file)))
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}

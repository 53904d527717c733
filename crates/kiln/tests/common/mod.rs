// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Loaders and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln::{
    BuildOutput, BuildingLoader, CacheOptions, FilenameParser, KilnError, Loader, PipelineOptions,
    RequestContext, Response, Result, ServingLoader, Target,
};

/// A tiny SCSS stand-in: `$name: value;` lines define variables that are
/// substituted into the remaining lines.
pub fn compile_scss(source: &str) -> String {
    let mut vars: Vec<(String, String)> = Vec::new();
    let mut out = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('$') {
            if let Some((name, value)) = rest.split_once(':') {
                vars.push((format!("${}", name.trim()), value.trim().trim_end_matches(';').to_string()));
                continue;
            }
        }
        let mut line = line.to_string();
        for (name, value) in &vars {
            line = line.replace(name.as_str(), value);
        }
        out.push(line);
    }
    out.join("\n")
}

/// Compiles `.scss` files on request (slowly) and at build time.
#[derive(Default)]
pub struct ScssLoader {
    pub compiles: AtomicUsize,
    pub delay: Duration,
}

impl ScssLoader {
    pub fn slow() -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay: Duration::from_millis(150),
        })
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for ScssLoader {
    fn name(&self) -> &str {
        "scss"
    }

    fn extensions(&self) -> Vec<String> {
        vec![".scss".into()]
    }

    fn serving(&self) -> Option<&dyn ServingLoader> {
        Some(self)
    }

    fn building(&self) -> Option<&dyn BuildingLoader> {
        Some(self)
    }
}

#[async_trait]
impl ServingLoader for ScssLoader {
    async fn handle(&self, file: &Path, _ctx: &RequestContext) -> Result<Response> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let source = tokio::fs::read_to_string(file).await?;
        Ok(Response::ok(compile_scss(&source)).with_header("Content-Type", "text/css"))
    }
}

#[async_trait]
impl BuildingLoader for ScssLoader {
    async fn build(&self, file: &Path, names: &FilenameParser) -> Result<Vec<BuildOutput>> {
        let source = tokio::fs::read_to_string(file).await?;
        Ok(vec![BuildOutput::new(
            names.parse("[name].css"),
            Target::Asset,
            compile_scss(&source),
        )])
    }
}

/// Build-only loader for `.page` files: one server module and one browser
/// script per page.
pub struct PageLoader;

#[async_trait]
impl Loader for PageLoader {
    fn name(&self) -> &str {
        "page"
    }

    fn extensions(&self) -> Vec<String> {
        vec![".page".into()]
    }

    fn building(&self) -> Option<&dyn BuildingLoader> {
        Some(self)
    }
}

#[async_trait]
impl BuildingLoader for PageLoader {
    async fn build(&self, file: &Path, names: &FilenameParser) -> Result<Vec<BuildOutput>> {
        let source = tokio::fs::read_to_string(file).await?;
        if source.contains("syntax error") {
            return Err(KilnError::loader("page", file, "syntax error"));
        }
        Ok(vec![
            BuildOutput::new(names.parse("[name].js"), Target::Server, format!("export default {:?};", source))
                .with_externals(["kiln"]),
            BuildOutput::new(names.parse("[name].client.js"), Target::Browser, format!("console.log({:?});", source)),
        ])
    }
}

/// Serves `.form` files for GET and POST, echoing the method and the `slug`
/// parameter. Asks for every response to be cached.
#[derive(Default)]
pub struct FormLoader {
    pub calls: AtomicUsize,
}

impl FormLoader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for FormLoader {
    fn name(&self) -> &str {
        "form"
    }

    fn extensions(&self) -> Vec<String> {
        vec![".form".into()]
    }

    fn serving(&self) -> Option<&dyn ServingLoader> {
        Some(self)
    }
}

#[async_trait]
impl ServingLoader for FormLoader {
    async fn handle(&self, _file: &Path, ctx: &RequestContext) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::ok(format!(
            "{} slug={}",
            ctx.request.method,
            ctx.param("slug").unwrap_or("-")
        )))
    }

    fn methods(&self) -> &[&str] {
        &["GET", "POST"]
    }

    fn should_cache(&self, _file: &Path, _ctx: &RequestContext, _response: &Response) -> bool {
        true
    }
}

/// Options rooted in `dir`: routes in `app/`, cache in `.cache/`, builds in `dist/`.
pub fn options(dir: &Path, dev: bool) -> PipelineOptions {
    PipelineOptions {
        dir: dir.join("app"),
        dev,
        cache: CacheOptions {
            root: Some(dir.join(".cache")),
            preserve: Some(false),
        },
        out_dir: dir.join("dist"),
        watch_debounce: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Writes `content` to `app/<relative>` under `dir`.
pub fn write_source(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join("app").join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

pub const STYLES: &str = "$gap: 44px;\nbody {\n  margin: $gap;\n}\n";

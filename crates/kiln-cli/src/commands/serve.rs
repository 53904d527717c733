// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production server command.
//!
//! Serves the output of `kiln build` from its manifest. No transforms run
//! and no files are watched.
//!
//! Artifacts built for the server target are answered by registered
//! [`kiln::ServerModule`]s. The stock `kiln` binary registers none, so those
//! routes fail with a 500; a host embedding this crate registers its modules
//! through [`run_with`].

use console::style;
use kiln::{Manifest, Pipeline, PipelineBuilder, PipelineOptions};
use tracing::warn;

use crate::config::Config;

/// Runs the production server with no server modules.
pub async fn run(host: &str, port: u16, dir: Option<String>) -> anyhow::Result<()> {
    run_with(host, port, dir, |builder| builder).await
}

/// Runs the production server, letting `extend` add server modules to the
/// pipeline before it is built.
pub async fn run_with<F>(host: &str, port: u16, dir: Option<String>, extend: F) -> anyhow::Result<()>
where
    F: FnOnce(PipelineBuilder) -> PipelineBuilder,
{
    let config = Config::load()?;
    let working_dir = std::env::current_dir()?;
    let mut options = config.pipeline_options(&working_dir, false);
    if let Some(dir) = dir {
        options.out_dir = working_dir.join(dir);
    }

    let manifest = match Manifest::load(&options.out_dir).await {
        Ok(manifest) => manifest,
        Err(e) if e.is_not_found() => {
            eprintln!(
                "{} No build found in {}",
                style("Error:").red().bold(),
                options.out_dir.display()
            );
            eprintln!("Run `kiln build` first");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    for missing in manifest.missing_files() {
        warn!("Manifest entry {} no longer exists", missing.display());
        println!(
            "{} {} is in the manifest but missing on disk",
            style("Warning:").yellow(),
            missing.display()
        );
    }

    let files = manifest.len();
    let pipeline = production_pipeline(options, manifest, extend)?;
    pipeline.setup().await?;

    let addr = format!("{}:{}", host, port);
    println!(
        "{} {} {}",
        style("Serving").green().bold(),
        style(format!("{} file(s) on", files)).dim(),
        style(format!("http://{}", addr)).cyan()
    );

    super::serve_until_stopped(&addr, pipeline).await
}

/// Builds a manifest-backed pipeline, passing the builder through `extend`.
pub fn production_pipeline<F>(
    options: PipelineOptions,
    manifest: Manifest,
    extend: F,
) -> kiln::Result<Pipeline>
where
    F: FnOnce(PipelineBuilder) -> PipelineBuilder,
{
    extend(Pipeline::builder(options).manifest(manifest)).build()
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with watch-based cache invalidation.
//!
//! The stock `kiln` binary registers no loaders, so every route is served
//! raw. A host embedding this crate adds its loaders through [`run_with`].

use std::time::Instant;

use console::style;
use kiln::{Pipeline, PipelineBuilder};

use crate::config::Config;

/// Runs the development server with no loaders.
pub async fn run(host: Option<String>, port: Option<u16>, quiet: bool) -> anyhow::Result<()> {
    run_with(host, port, quiet, |builder| builder).await
}

/// Runs the development server, letting `extend` add loaders to the pipeline
/// before it is built.
pub async fn run_with<F>(host: Option<String>, port: Option<u16>, quiet: bool, extend: F) -> anyhow::Result<()>
where
    F: FnOnce(PipelineBuilder) -> PipelineBuilder,
{
    let config = Config::load()?;
    let working_dir = std::env::current_dir()?;
    let options = config.pipeline_options(&working_dir, true);

    let start = Instant::now();
    let pipeline = extend(Pipeline::builder(options.clone())).build()?;
    pipeline.setup().await?;

    if !quiet {
        let routes = pipeline.routes().await;
        println!(
            "  {} {} {}",
            style("✓").green(),
            style(format!(
                "{} route(s) in {}",
                routes.len(),
                options.dir.display()
            ))
            .dim(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        );
        for route in &routes {
            println!(
                "    {} -> {}",
                style(&route.matcher).cyan(),
                route.file_path.display()
            );
        }
    }

    let host = host.unwrap_or(config.dev.host);
    let port = port.unwrap_or(config.dev.port);
    let addr = format!("{}:{}", host, port);

    if !quiet {
        println!();
        println!(
            "  {} {}",
            style("kiln dev").green().bold(),
            style(format!("http://{}", addr)).cyan()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    super::serve_until_stopped(&addr, pipeline).await
}

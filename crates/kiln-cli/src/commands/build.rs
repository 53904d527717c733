// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Build command for producing a manifest-described output directory.

use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kiln::{KilnError, Manifest, Pipeline, Target};

use crate::config::Config;

/// Runs the build command.
pub async fn run(output: Option<String>, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let working_dir = std::env::current_dir()?;
    let mut options = config.pipeline_options(&working_dir, false);
    if let Some(output) = output {
        options.out_dir = working_dir.join(output);
    }

    if !quiet {
        println!(
            "{} {}",
            style("Building routes from:").cyan(),
            options.dir.display()
        );
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Transforming and bundling...");

    let start = Instant::now();
    let pipeline = Pipeline::builder(options.clone()).build()?;
    pipeline.setup().await?;
    let result = pipeline.build().await;
    pipeline.shutdown().await;

    let manifest = match result {
        Ok(manifest) => manifest,
        Err(e) => {
            spinner.finish_and_clear();
            print_failure(&e);
            return Err(e.into());
        }
    };
    spinner.finish_and_clear();

    if !quiet {
        print_summary(&manifest);
        println!(
            "{} {} {}",
            style("✓").green(),
            style(format!(
                "Built {} file(s) into {}",
                manifest.len(),
                options.out_dir.display()
            ))
            .green()
            .bold(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        );
    }

    Ok(())
}

fn print_summary(manifest: &Manifest) {
    for target in [Target::Server, Target::Browser, Target::Asset] {
        let count = manifest.files.values().filter(|t| **t == target).count();
        if count > 0 {
            println!("  {} {}", style(format!("{:<8}", target.as_str())).cyan(), count);
        }
    }
}

fn print_failure(error: &KilnError) {
    match error {
        KilnError::Build { target, file, logs } => {
            eprintln!(
                "{} {}",
                style("✗").red(),
                style(format!("{} build failed", target)).red().bold()
            );
            if let Some(file) = file {
                eprintln!("  {} {}", style("in").dim(), file.display());
            }
            for line in &logs.0 {
                eprintln!("    {}", style(line).dim());
            }
        }
        other => eprintln!("{} {}", style("✗").red(), style(other).red().bold()),
    }
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use kiln_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Filesystem-routed content pipeline", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Quiet mode: only show errors (useful for CI)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the development server with on-demand transforms
    Dev {
        /// Port to run the dev server on (overrides kiln.toml)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (overrides kiln.toml)
        #[arg(long)]
        host: Option<String>,
    },
    /// Build every route ahead of time
    Build {
        /// Output directory (overrides kiln.toml)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Serve a production build from its manifest
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Build directory to serve (overrides kiln.toml)
        #[arg(short, long)]
        dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Dev { port, host } => commands::dev::run(host, port, cli.quiet).await,
        Commands::Build { output } => commands::build::run(output, cli.quiet).await,
        Commands::Serve { port, host, dir } => commands::serve::run(&host, port, dir).await,
    }
}

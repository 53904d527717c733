// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `dev`: Serve sources with on-demand transforms and a watched cache
//! - `build`: Build every route into the output directory
//! - `serve`: Serve a finished build from its manifest

/// Production build command.
pub mod build;
/// Development server command.
pub mod dev;
/// Production server command.
pub mod serve;

use kiln::Pipeline;

/// Serves `pipeline` on `addr` until Ctrl+C, then shuts it down.
pub(crate) async fn serve_until_stopped(addr: &str, pipeline: Pipeline) -> anyhow::Result<()> {
    let result = tokio::select! {
        result = crate::server::serve(addr, pipeline.clone()) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    pipeline.shutdown().await;
    result
}

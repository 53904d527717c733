// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! # kiln-cli
//!
//! Command-line host for the kiln content pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Serve ./app with on-demand transforms and watch-based invalidation
//! kiln dev --port 3000
//!
//! # Build every route into ./kiln-build with a manifest
//! kiln build
//!
//! # Serve a finished build from its manifest
//! kiln serve --port 8080
//! ```
//!
//! Settings are read from `kiln.toml` in the current directory.

/// CLI command implementations.
pub mod commands;
/// Project configuration (`kiln.toml`).
pub mod config;
/// HTTP adapter between axum and the pipeline.
pub mod server;

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server components.
//!
//! The pipeline is transport independent; this module is the axum host that
//! turns HTTP requests into [`kiln::Request`]s and pipeline responses back
//! into HTTP.

/// HTTP server implementation using Axum.
pub mod http;

pub use http::{create_app, serve};

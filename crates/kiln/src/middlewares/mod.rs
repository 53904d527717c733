// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Built-in middlewares.
//!
//! Each one installs itself on a pipeline's [`crate::Middlewares`] under a
//! fixed `@builtin.*` name and can be removed again with `uninstall`.

mod cors;
mod html_rewriter;
mod rate_limit;

pub use cors::{AllowOrigin, Cors, CorsOptions};
pub use html_rewriter::HtmlRewriter;
pub use rate_limit::{RateLimit, RateLimitOptions};

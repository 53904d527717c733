// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Cross-origin resource sharing.
//!
//! Answers preflight `OPTIONS` requests on the `request` channel and adds the
//! `Access-Control-*` headers to responses on the `response` channel. A
//! request from an origin that is not allowed gets
//! `403 Blocked by CORS policy`.
//!
//! The response hook answers with the decorated response, which ends the
//! `response` chain; install it after other response middlewares.

use std::sync::Arc;

use crate::channel::{ChannelName, Middlewares, Outcome, RequestPayload, ResponsePayload};
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Which origins may access resources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllowOrigin {
    /// Any origin; answers `*`.
    #[default]
    Any,
    /// Any origin; echoes the request origin.
    Mirror,
    /// Only the listed origins.
    List(Vec<String>),
    /// CORS handling is off.
    Disabled,
}

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsOptions {
    /// Allowed origins.
    pub origin: AllowOrigin,
    /// Value of `Access-Control-Allow-Methods`.
    pub methods: Vec<String>,
    /// Value of `Access-Control-Allow-Headers`; `None` reflects
    /// `Access-Control-Request-Headers`.
    pub allowed_headers: Option<Vec<String>>,
    /// Value of `Access-Control-Expose-Headers`.
    pub exposed_headers: Vec<String>,
    /// Send `Access-Control-Allow-Credentials: true`.
    pub credentials: bool,
    /// Value of `Access-Control-Max-Age`, in seconds.
    pub max_age: Option<u64>,
    /// Status of a successful preflight.
    pub options_success_status: u16,
    /// Let preflight requests continue through the pipeline.
    pub preflight_continue: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: AllowOrigin::Any,
            methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: None,
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: None,
            options_success_status: 204,
            preflight_continue: false,
        }
    }
}

/// The CORS middleware.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    options: Arc<CorsOptions>,
}

impl Cors {
    /// Name the handlers are registered under.
    pub const NAME: &'static str = "@builtin.cors";

    /// Creates the middleware.
    pub fn new(options: CorsOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Registers the preflight and response hooks.
    pub fn install(&self, middlewares: &Middlewares) -> Result<()> {
        let options = self.options.clone();
        middlewares.request.add(Self::NAME, move |payload: RequestPayload| {
            let options = options.clone();
            async move { Ok(preflight(&options, &payload.request)) }
        })?;

        let options = self.options.clone();
        middlewares.response.add(Self::NAME, move |payload: ResponsePayload| {
            let options = options.clone();
            async move { Ok(decorate(&options, &payload.request, payload.response)) }
        })?;
        Ok(())
    }

    /// Removes the hooks.
    pub fn uninstall(middlewares: &Middlewares) {
        middlewares.remove(ChannelName::Request, Self::NAME);
        middlewares.remove(ChannelName::Response, Self::NAME);
    }
}

fn blocked() -> Response {
    Response::empty(403).with_status_text("Blocked by CORS policy")
}

fn preflight(options: &CorsOptions, request: &Request) -> Outcome<Response> {
    let Some(origin) = request.header("origin") else {
        return Outcome::Continue;
    };
    if request.method != "OPTIONS" || options.origin == AllowOrigin::Disabled {
        return Outcome::Continue;
    }

    let Some(allow) = resolve_origin(options, origin) else {
        return Outcome::Respond(blocked());
    };
    if options.preflight_continue {
        return Outcome::Continue;
    }

    let mut response = Response::empty(options.options_success_status);
    apply_headers(options, &allow, &mut response, request);
    Outcome::Respond(response)
}

fn decorate(options: &CorsOptions, request: &Request, mut response: Response) -> Outcome<Response> {
    let Some(origin) = request.header("origin") else {
        return Outcome::Continue;
    };
    if options.origin == AllowOrigin::Disabled {
        return Outcome::Continue;
    }

    match resolve_origin(options, origin) {
        Some(allow) => {
            apply_headers(options, &allow, &mut response, request);
            Outcome::Respond(response)
        }
        None => Outcome::Respond(blocked()),
    }
}

fn resolve_origin(options: &CorsOptions, origin: &str) -> Option<String> {
    match &options.origin {
        AllowOrigin::Any => Some("*".to_string()),
        AllowOrigin::Mirror => Some(origin.to_string()),
        AllowOrigin::List(allowed) => allowed.iter().any(|a| a == origin).then(|| origin.to_string()),
        AllowOrigin::Disabled => None,
    }
}

fn apply_headers(options: &CorsOptions, allow: &str, response: &mut Response, request: &Request) {
    response.set_header("access-control-allow-origin", allow);
    response.set_header("access-control-allow-methods", options.methods.join(","));

    let allow_headers = match &options.allowed_headers {
        Some(headers) => Some(headers.join(",")),
        None => request
            .header("access-control-request-headers")
            .map(str::to_string),
    };
    if let Some(headers) = allow_headers {
        response.set_header("access-control-allow-headers", headers);
    }
    if !options.exposed_headers.is_empty() {
        response.set_header("access-control-expose-headers", options.exposed_headers.join(","));
    }
    if options.credentials {
        response.set_header("access-control-allow-credentials", "true");
    }
    if let Some(max_age) = options.max_age {
        response.set_header("access-control-max-age", max_age.to_string());
    }
}

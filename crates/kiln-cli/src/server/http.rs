// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP adapter for the pipeline.
//!
//! This is a thin adapter that converts HTTP requests to [`kiln::Request`],
//! calls [`Pipeline::handle`], and converts [`kiln::Response`] back to HTTP.
//! Every path goes through the fallback handler; routing is the pipeline's
//! job.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use kiln::Pipeline;
use tower_http::trace::TraceLayer;
use tracing::error;

const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Header carrying the pipeline's status text, since HTTP/2 has no reason
/// phrase.
pub const STATUS_TEXT_HEADER: &str = "x-kiln-status-text";

/// Builds the axum application answering every request through `pipeline`.
pub fn create_app(pipeline: Pipeline) -> Router {
    Router::new()
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Binds `addr` and serves `pipeline` until the process is stopped.
pub async fn serve(addr: &str, pipeline: Pipeline) -> anyhow::Result<()> {
    let app = create_app(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn fallback_handler(State(pipeline): State<Pipeline>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let target = match parts.uri.query() {
        Some(query) => format!("{}?{}", parts.uri.path(), query),
        None => parts.uri.path().to_string(),
    };
    let mut request = kiln::Request::new(parts.method.as_str(), target);

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    // Absent when the app is driven without a socket (tests).
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        request = request.with_client(addr.ip().to_string());
    }

    if parts.method != Method::GET && parts.method != Method::HEAD {
        match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
            Ok(bytes) if !bytes.is_empty() => request = request.with_body(bytes.to_vec()),
            Ok(_) => {}
            Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "Body too large").into_response(),
        }
    }

    let head = parts.method == Method::HEAD;
    match pipeline.handle(request).await {
        Ok(response) => to_http(response, head),
        Err(e) => {
            error!("Request to {} failed: {}", parts.uri.path(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Converts a pipeline response to HTTP.
fn to_http(response: kiln::Response, head: bool) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = axum::http::Response::builder().status(status);

    for (key, value) in &response.headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => tracing::warn!("Dropping invalid response header '{}'", key),
        }
    }
    if let Some(text) = &response.status_text {
        if let Ok(value) = HeaderValue::from_str(text) {
            builder = builder.header(STATUS_TEXT_HEADER, value);
        }
    }

    // Diagnostics of body-less errors are shown to the client.
    let body = match (&response.status_text, head) {
        (_, true) => Body::empty(),
        (Some(text), false) if response.body.is_empty() && !status.is_success() => {
            Body::from(text.clone())
        }
        _ => Body::from(response.body),
    };

    builder.body(body).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response").into_response()
    })
}

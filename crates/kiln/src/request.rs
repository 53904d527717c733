// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Transport-independent request type.
//!
//! Adapters (the HTTP server in `kiln-cli`, tests) build a [`Request`] and hand
//! it to [`crate::Pipeline::handle`].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::router::Route;

/// A platform-agnostic HTTP request.
///
/// # Example
///
/// ```rust
/// use kiln::Request;
///
/// let request = Request::new("GET", "/styles")
///     .with_header("Origin", "https://example.com");
/// assert_eq!(request.header("origin"), Some("https://example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method, upper-cased (e.g. "GET").
    pub method: String,

    /// The request path without query string (e.g. "/blog/hello").
    pub path: String,

    /// Raw query string, if any.
    pub query: Option<String>,

    /// HTTP headers, keys lower-cased.
    pub headers: HashMap<String, String>,

    /// Request body.
    pub body: Option<Vec<u8>>,

    /// Remote client address, when the transport knows it.
    pub client: Option<String>,
}

impl Request {
    /// Creates a request; a query string in `target` is split off.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };

        Self {
            method: method.into().to_ascii_uppercase(),
            path,
            query,
            headers: HashMap::new(),
            body: None,
            client: None,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target)
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the client address.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns true for GET and HEAD.
    pub fn is_read(&self) -> bool {
        self.method == "GET" || self.method == "HEAD"
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::get("/")
    }
}

/// Everything a loader sees about the request it answers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The incoming request.
    pub request: Request,
    /// The matched route.
    pub route: Route,
    /// Dynamic segment values extracted from the URL.
    pub params: Vec<(String, String)>,
}

impl RequestContext {
    /// Source file of the matched route.
    pub fn file(&self) -> &PathBuf {
        &self.route.file_path
    }

    /// Get a parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

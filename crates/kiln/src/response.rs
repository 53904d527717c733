// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Transport-independent response type.
//!
//! Loaders, middleware and the manifest server all produce a [`Response`];
//! adapters convert it to their platform-specific response format.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A platform-agnostic HTTP response.
///
/// # Example
///
/// ```rust
/// use kiln::Response;
///
/// let css = Response::ok("body { margin: 0 }").with_header("Content-Type", "text/css");
/// assert_eq!(css.content_type(), Some("text/css"));
///
/// let missing = Response::not_found();
/// assert_eq!(missing.status, 404);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Optional reason phrase; carries diagnostics on configuration errors.
    pub status_text: Option<String>,
    /// HTTP headers, keys lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// Status and headers of a response, without its body.
///
/// Stored next to cached content so a cache hit can be replayed with the
/// same metadata the loader produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// HTTP status code.
    pub status: u16,
    /// HTTP headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Response {
    /// Creates a response with a status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: None,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Creates a 200 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// Creates a response with no body.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    /// Empty 404 response.
    pub fn not_found() -> Self {
        Self::empty(404)
    }

    /// Empty 405 response.
    pub fn method_not_allowed() -> Self {
        Self::empty(405)
    }

    /// 500 response whose status text names what is misconfigured.
    pub fn config_error(text: impl Into<String>) -> Self {
        Self::empty(500).with_status_text(text)
    }

    /// Serves raw bytes with a content type inferred from `path`.
    pub fn file(path: &Path, body: Vec<u8>) -> Self {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        Self::ok(body).with_header("content-type", mime.essence_str())
    }

    /// Rebuilds a response from cached metadata and body.
    pub fn from_meta(meta: ResponseMeta, body: Vec<u8>) -> Self {
        Self {
            status: meta.status,
            status_text: None,
            headers: meta.headers,
            body,
        }
    }

    /// Extracts the replayable metadata of this response.
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            status: self.status,
            headers: self.headers.clone(),
        }
    }

    /// Sets the status text.
    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Sets a header in place.
    pub fn set_header(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The `content-type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::empty(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_infers_content_type() {
        let resp = Response::file(Path::new("/x/styles.css"), b"a{}".to_vec());
        assert_eq!(resp.content_type(), Some("text/css"));

        let resp = Response::file(Path::new("/x/blob.unknownext"), vec![1, 2]);
        assert_eq!(resp.content_type(), Some("application/octet-stream"));
    }

    #[test]
    fn test_meta_round_trip_keeps_headers() {
        let resp = Response::new(201, "x").with_header("X-Custom", "value");
        let replay = Response::from_meta(resp.meta(), resp.body.clone());
        assert_eq!(replay.status, 201);
        assert_eq!(replay.header("x-custom"), Some("value"));
    }

    #[test]
    fn test_config_error() {
        let resp = Response::config_error("'/a' is not declared in the manifest");
        assert_eq!(resp.status, 500);
        assert!(resp.body.is_empty());
        assert!(resp.status_text.unwrap().contains("manifest"));
    }
}

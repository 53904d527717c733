// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Pipeline and cache configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "KILN_CACHE_DIR";

/// Environment variable; `"true"` keeps the cache of previous runs.
pub const PRESERVE_CACHE_ENV: &str = "KILN_PRESERVE_CACHE";

/// Cache root used when neither options nor environment name one.
pub const DEFAULT_CACHE_DIR: &str = "./.kiln";

/// Where the content cache lives and whether it survives restarts.
///
/// Each field resolves as: explicit value, then environment variable, then
/// default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Cache root directory.
    pub root: Option<PathBuf>,
    /// Keep artifacts written by previous runs.
    pub preserve: Option<bool>,
}

impl CacheOptions {
    /// The effective cache root.
    pub fn root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        match std::env::var(CACHE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }

    /// Whether previous artifacts are kept at setup.
    pub fn preserve(&self) -> bool {
        self.preserve
            .unwrap_or_else(|| std::env::var(PRESERVE_CACHE_ENV).map(|v| v == "true").unwrap_or(false))
    }
}

/// Options of a [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Routes directory.
    pub dir: PathBuf,
    /// Development mode: arms the file watcher on cache writes.
    pub dev: bool,
    /// Extensions served by the built-in static loader (e.g. `.css`).
    pub static_files: Vec<String>,
    /// Content cache settings.
    pub cache: CacheOptions,
    /// Build output directory.
    pub out_dir: PathBuf,
    /// Quiet period before the watcher reports a batch of changes.
    pub watch_debounce: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./app"),
            dev: true,
            static_files: Vec::new(),
            cache: CacheOptions::default(),
            out_dir: PathBuf::from("./kiln-build"),
            watch_debounce: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_values_win() {
        let options = CacheOptions {
            root: Some(PathBuf::from("/tmp/explicit")),
            preserve: Some(true),
        };
        assert_eq!(options.root(), PathBuf::from("/tmp/explicit"));
        assert!(options.preserve());
    }

    #[test]
    fn test_defaults() {
        let options = PipelineOptions::default();
        assert_eq!(options.dir, PathBuf::from("./app"));
        assert_eq!(options.out_dir, PathBuf::from("./kiln-build"));
        assert!(options.dev);
        assert_eq!(options.watch_debounce, Duration::from_millis(100));
    }
}

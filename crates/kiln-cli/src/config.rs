// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Configuration for kiln projects.
//!
//! This module handles loading and parsing the `kiln.toml` configuration file.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "my-site"
//!
//! [dev]
//! port = 3000
//! host = "127.0.0.1"
//!
//! [pipeline]
//! dir = "app"
//! static_files = [".png", ".svg", ".woff2"]
//!
//! [build]
//! output_dir = "kiln-build"
//!
//! [cache]
//! root = ".kiln"
//! preserve = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln::{CacheOptions, PipelineOptions};
use serde::{Deserialize, Serialize};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Root configuration structure for kiln projects.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Development server settings.
    #[serde(default)]
    pub dev: DevConfig,
    /// Source routing and loader settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Production build settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Content cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Project metadata configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Project version.
    #[serde(default = "default_version")]
    pub version: String,
}

/// Development server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Milliseconds to coalesce file events for.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Source routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Routes directory.
    #[serde(default = "default_dir")]
    pub dir: String,
    /// Extensions served raw by the built-in static loader.
    #[serde(default)]
    pub static_files: Vec<String>,
}

/// Production build configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Output directory for built artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

/// Content cache configuration.
///
/// Unset values fall back to `KILN_CACHE_DIR` / `KILN_PRESERVE_CACHE`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cache root directory.
    pub root: Option<String>,
    /// Keep the cache contents across restarts.
    pub preserve: Option<bool>,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_dir() -> String {
    "app".to_string()
}

fn default_output_dir() -> String {
    "kiln-build".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            static_files: Vec::new(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from `kiln.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Loads configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Pipeline options for this project, relative to `base`.
    pub fn pipeline_options(&self, base: &Path, dev: bool) -> PipelineOptions {
        PipelineOptions {
            dir: base.join(&self.pipeline.dir),
            dev,
            static_files: self.pipeline.static_files.clone(),
            cache: CacheOptions {
                root: self.cache.root.as_ref().map(|root| base.join(root)),
                preserve: self.cache.preserve,
            },
            out_dir: base.join(&self.build.output_dir),
            watch_debounce: Duration::from_millis(self.dev.debounce_ms),
        }
    }

    /// Absolute build output directory relative to `base`.
    pub fn output_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.build.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();

        assert_eq!(config.project.name, "unnamed");
        assert_eq!(config.dev.port, 3000);
        assert_eq!(config.pipeline.dir, "app");
        assert_eq!(config.build.output_dir, "kiln-build");
        assert!(config.cache.root.is_none());
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
[dev]
port = 4000

[pipeline]
static_files = [".png", ".SVG"]

[cache]
root = "tmp/cache"
preserve = true
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.dev.port, 4000);
        assert_eq!(config.dev.host, "127.0.0.1");
        assert_eq!(config.pipeline.dir, "app");

        let options = config.pipeline_options(dir.path(), true);
        assert_eq!(options.dir, dir.path().join("app"));
        assert_eq!(options.static_files, vec![".png", ".SVG"]);
        assert_eq!(options.cache.root(), dir.path().join("tmp/cache"));
        assert!(options.cache.preserve());
        assert_eq!(options.out_dir, dir.path().join("kiln-build"));
        assert_eq!(options.watch_debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[dev]\nport = \"not a number\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}

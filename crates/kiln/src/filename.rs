// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Deterministic output filenames derived from a source path.
//!
//! Patterns understand four tokens:
//!
//! - `[name]`: source file stem (`styles` for `styles.scss`)
//! - `[ext]`: source extension including the dot (`.scss`)
//! - `[hash]`: hex digest of the absolute source path
//! - `[time]`: creation time of the parser, in milliseconds since the epoch

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Expands filename patterns for one source file.
#[derive(Debug, Clone)]
pub struct FilenameParser {
    from: PathBuf,
    name: String,
    ext: String,
    hash: String,
    time: String,
}

impl FilenameParser {
    /// Creates a parser for `from`, fixing its hash and timestamp.
    pub fn new(from: impl Into<PathBuf>) -> Self {
        let from = from.into();
        let name = from
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = from
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let digest = Sha256::digest(from.to_string_lossy().as_bytes());
        let hash = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();

        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            .to_string();

        Self { from, name, ext, hash, time }
    }

    /// The source path this parser was created for.
    pub fn source(&self) -> &Path {
        &self.from
    }

    /// Hex digest of the source path.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Creation timestamp used for `[time]`.
    pub fn time(&self) -> &str {
        &self.time
    }

    /// Substitutes every token in `pattern`.
    pub fn parse(&self, pattern: &str) -> String {
        pattern
            .replace("[name]", &self.name)
            .replace("[ext]", &self.ext)
            .replace("[hash]", &self.hash)
            .replace("[time]", &self.time)
    }

    /// Parses `pattern` and places the result next to the source file.
    ///
    /// `FilenameParser::new("/a/file.ext").replace("_[name][ext].js")`
    /// yields `/a/_file.ext.js`.
    pub fn replace(&self, pattern: &str) -> PathBuf {
        let dir = self.from.parent().unwrap_or_else(|| Path::new(""));
        dir.join(self.parse(pattern))
    }
}

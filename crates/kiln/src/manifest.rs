// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The build manifest.
//!
//! A manifest records every entry-point artifact of a build with its
//! [`Target`], plus the set of artifact extensions the production router must
//! scan for. It is the contract between `build` and `serve`:
//!
//! ```json
//! {
//!   "files": { "/srv/dist/styles.css": "asset", "/srv/dist/api.js": "server" },
//!   "extensions": [".css", ".js"],
//!   "version": "0.1.0"
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::build::Target;
use crate::error::Result;
use crate::router::extension_of;

/// File name of the manifest inside the build output directory.
pub const MANIFEST_FILE: &str = ".kiln-manifest.json";

/// Artifacts of one build and how to serve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Absolute artifact path to target.
    pub files: BTreeMap<String, Target>,
    /// Extensions of the recorded artifacts, with leading dots.
    pub extensions: BTreeSet<String>,
    /// Version of kiln that wrote the manifest.
    pub version: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            extensions: BTreeSet::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Manifest {
    /// Creates an empty manifest stamped with the current version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the manifest in `out_dir`.
    pub fn path_in(out_dir: &Path) -> PathBuf {
        out_dir.join(MANIFEST_FILE)
    }

    /// Records `artifact` and its extension.
    pub fn insert(&mut self, artifact: &Path, target: Target) {
        if let Some(ext) = extension_of(artifact) {
            self.extensions.insert(ext);
        }
        self.files
            .insert(artifact.to_string_lossy().into_owned(), target);
    }

    /// Target of `artifact`, if recorded.
    pub fn kind_of(&self, artifact: &Path) -> Option<Target> {
        self.files.get(artifact.to_string_lossy().as_ref()).copied()
    }

    /// Reads the manifest saved in `out_dir`.
    pub async fn load(out_dir: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(Self::path_in(out_dir)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the manifest into `out_dir` and returns its path.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// readers never see a partial manifest.
    pub async fn save(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(out_dir);
        let tmp = out_dir.join(format!("{}.tmp", MANIFEST_FILE));

        tokio::fs::create_dir_all(out_dir).await?;
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Recorded artifacts that no longer exist on disk.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.files
            .keys()
            .map(PathBuf::from)
            .filter(|p| !p.is_file())
            .collect()
    }

    /// Number of recorded artifacts.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the kiln content pipeline.
//!
//! This module defines [`KilnError`], the main error enum, plus
//! [`ChannelError`] for middleware registration failures.
//!
//! # Error Categories
//!
//! - **I/O errors**: genuine filesystem faults. A missing cache entry is
//!   never one of these; see [`crate::cache::CacheLookup::Miss`].
//! - **Configuration errors**: a route has no usable loader contract
//! - **Build errors**: bundler diagnostics grouped per target
//! - **Loader errors**: a loader failed while transforming a file
//! - **Channel errors**: duplicate names or exhausted channel capacity
//! - **Rewrite errors**: an HTML rewrite rule was invalid or failed

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::build::Target;
use crate::router::RoutingError;

/// Errors raised while registering middleware on a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A handler with the same name is already registered on the channel.
    #[error("'{0}' already exists on this middleware channel")]
    AlreadyExists(String),

    /// The channel is full.
    #[error("exceeded middleware channel limit")]
    LimitExceeded,
}

/// Bundler diagnostics collected for one failed target.
#[derive(Debug, Clone, Default)]
pub struct BuildLogs(pub Vec<String>);

impl fmt::Display for BuildLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.0 {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}

/// The main error type for kiln operations.
#[derive(Error, Debug)]
pub enum KilnError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or metadata (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Route discovery failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// An operation that needs `setup()` ran before it.
    #[error("run setup first")]
    NotReady,

    /// A matched file has no usable loader contract.
    #[error("configuration error for '{}': {message}", file.display())]
    Config {
        /// The offending source file.
        file: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// A loader failed while transforming a file.
    #[error("loader '{loader}' failed on '{}': {message}", file.display())]
    Loader {
        /// Loader name.
        loader: String,
        /// The file being transformed.
        file: PathBuf,
        /// Error message from the loader.
        message: String,
    },

    /// Bundling a target failed; carries every diagnostic the bundler produced.
    #[error("errors were found during the {target} build{}:\n{logs}", file.as_ref().map(|f| format!(" of '{}'", f.display())).unwrap_or_default())]
    Build {
        /// The target whose bundle failed.
        target: Target,
        /// The entry point the bundler blamed, if any.
        file: Option<PathBuf>,
        /// Aggregated bundler diagnostics.
        logs: BuildLogs,
    },

    /// Middleware registration failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The filesystem watcher could not be started.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An HTML rewrite rule was invalid or failed.
    #[error("HTML rewriting error: {0}")]
    Rewrite(String),

    /// A shared lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    /// An error passed through the `error` channel without being answered.
    #[error("{0}")]
    Unhandled(Arc<KilnError>),
}

impl KilnError {
    /// Creates a loader error.
    pub fn loader(loader: impl Into<String>, file: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Loader {
            loader: loader.into(),
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Creates a configuration error.
    pub fn config(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Returns true when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::Unhandled(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

/// Convenience type alias for Results with [`KilnError`].
pub type Result<T> = std::result::Result<T, KilnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_messages() {
        assert_eq!(
            ChannelError::AlreadyExists("cors".into()).to_string(),
            "'cors' already exists on this middleware channel"
        );
        assert_eq!(
            ChannelError::LimitExceeded.to_string(),
            "exceeded middleware channel limit"
        );
    }

    #[test]
    fn test_build_error_names_target_and_file() {
        let err = KilnError::Build {
            target: Target::Browser,
            file: Some(PathBuf::from("/app/main.ts")),
            logs: BuildLogs(vec!["unexpected token".into(), "missing import".into()]),
        };
        let message = err.to_string();
        assert!(message.contains("browser build"));
        assert!(message.contains("/app/main.ts"));
        assert!(message.contains("unexpected token"));
        assert!(message.contains("missing import"));
    }

    #[test]
    fn test_is_not_found() {
        let err = KilnError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        let shared = KilnError::Unhandled(Arc::new(err));
        assert!(shared.is_not_found());
        assert!(!KilnError::NotReady.is_not_found());
    }
}

//! Error taxonomy.
//!
//! Application-level failures (404, 403, 500) are expressed as HTTP
//! [`Response`](crate::Response) values and never surface here. These types
//! cover the fallible machinery around serving: loading sources, merging
//! them into a routing table, configuration, and the server itself.

use std::path::PathBuf;

use thiserror::Error;

/// The error type returned by krume's top-level fallible operations:
/// booting an [`App`](crate::App), attaching a watcher, serving.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration was unreadable or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The initial source build at boot failed. Unlike later rebuilds,
    /// there is no previous routing table to fall back to, so this is fatal.
    #[error("boot build failed: {0}")]
    Boot(#[from] RebuildError),

    /// The filesystem watcher could not be created or attached.
    #[error("watch: {0}")]
    Watch(#[from] notify::Error),
}

/// A source loader failed to produce its map.
///
/// Loaders are application code; this type is deliberately loose so they can
/// wrap whatever went wrong (an unreadable directory, a bad frontmatter
/// block) with a human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoadError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LoadError {
    /// A load failure described by a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    /// A load failure wrapping an underlying error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self { message: message.into(), source: Some(source.into()) }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::with_source("io error while loading", e)
    }
}

/// Merging loader outputs into a routing table failed.
///
/// Same-namespace duplicates are not errors (the later registration wins,
/// with a warning); only cross-namespace collisions and malformed patterns
/// reject the whole build.
#[derive(Debug, Error)]
pub enum MergeError {
    /// One or more paths are registered in both the plain-route namespace
    /// (pages, assets, scripts) and the API namespace. Carries every
    /// offending path.
    #[error("path(s) registered in both route and api namespaces: {}", paths.join(", "))]
    Conflict { paths: Vec<String> },

    /// A route key could not be compiled for matching.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A rebuild attempt failed. The previous routing table stays live.
#[derive(Debug, Error)]
pub enum RebuildError {
    /// One of the source loaders returned an error.
    #[error("{slot} loader failed: {source}")]
    Load {
        /// Which source slot failed: `pages`, `assets`, `scripts`, `api`
        /// or `middleware`.
        slot: &'static str,
        #[source]
        source: LoadError,
    },

    /// The loaded sources could not be merged into a table.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Configuration file or value errors. All of these are fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid bind address {addr:?}: {source}")]
    BindAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("debounce window must be at least 1 ms")]
    ZeroDebounce,

    #[error("watch path does not exist: {}", path.display())]
    WatchPath { path: PathBuf },
}

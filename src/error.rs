//! Error types for the registry, download and repack pipeline.

use std::io;

use thiserror::Error;

/// Failure classes the router maps to HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failures, timeouts and bad upstream statuses. Worth retrying.
    Transient,
    /// The package or version does not exist upstream.
    NotFound,
    /// Downloaded bytes did not match the published checksum.
    Integrity,
    /// The registry or the tarball returned something we cannot decode.
    Decode,
    /// Local file system failure.
    Io,
    /// The unpacked tree cannot be written as a module zip.
    Archive,
    /// The request itself is malformed.
    InvalidRequest,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("package {0:?} not found")]
    PackageNotFound(String),

    #[error("version {version:?} of package {package:?} not found")]
    VersionNotFound { package: String, version: String },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("malformed upstream data: {0}")]
    Decode(String),

    #[error("dependency {name:?} could not be resolved: {source}")]
    Dependency {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Archive(#[from] gomodzip::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Upstream(_) => ErrorKind::Transient,
            Self::PackageNotFound(_) | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::ChecksumMismatch { .. } => ErrorKind::Integrity,
            Self::Decode(_) => ErrorKind::Decode,
            // A missing dependency is bad upstream data, not a missing module.
            Self::Dependency { source, .. } => match source.kind() {
                ErrorKind::NotFound | ErrorKind::InvalidRequest => ErrorKind::Decode,
                kind => kind,
            },
            Self::Io { .. } | Self::Task(_) => ErrorKind::Io,
            Self::Archive(_) => ErrorKind::Archive,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

use std::io;

use thiserror::Error;

/// Errors raised while validating or writing a module zip.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed module path {path:?}: {reason}")]
    InvalidModulePath { path: String, reason: String },

    #[error("malformed version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("malformed file path {path:?}: {reason}")]
    InvalidFilePath { path: String, reason: String },

    #[error("case-insensitive file name collision: {first:?} and {second:?}")]
    CaseCollision { first: String, second: String },

    #[error("file {path:?} is {size} bytes, the limit is {limit}")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("module source tree too large (max size is {limit} bytes)")]
    TreeTooLarge { limit: u64 },

    #[error("file {path:?} changed size while it was being archived")]
    FileChanged { path: String },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

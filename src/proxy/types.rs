use std::fmt;
use std::time::Instant;

use axum::http::Method;

/// The four Go module proxy endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `$module/@v/list`
    List,
    /// `$module/@v/$version.info`
    Info,
    /// `$module/@v/$version.mod`
    Manifest,
    /// `$module/@v/$version.zip`
    Archive,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Info => "info",
            Operation::Manifest => "mod",
            Operation::Archive => "zip",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request asks for once its path has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// npm package name, scope marker restored.
    pub package: String,
    /// Version from the path, empty for `list`.
    pub version: String,
    /// `vN` from the module path, empty when the path has none.
    pub path_major: String,
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.package, self.version, self.path_major)
    }
}

/// Request lifecycle tracking for the access log.
pub struct RequestTrace {
    pub start: Instant,
    pub method: Method,
    pub path: String,
    pub operation: Option<Operation>,
}

impl RequestTrace {
    pub fn new(method: Method, path: String) -> Self {
        Self {
            start: Instant::now(),
            method,
            path,
            operation: None,
        }
    }

    pub fn summary(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

//! Mapping between npm package names and Go module paths.
//!
//! A package `@vue/reactivity` at `3.2.0` becomes the module
//! `<base>/___vue/reactivity/v3` at `v3.2.0`: the scope marker is replaced by
//! [`SCOPE_ESCAPE`] (Go module paths may not contain `@`) and the major
//! version suffix follows Go's rules, except that v0 keeps `/v0`. A 0.x
//! release is therefore only served under `<base>/<name>/v0`, a path the
//! go command refuses to request on its own.

use gomodzip::ModuleVersion;

use crate::version;

/// Marker npm uses to introduce a scope.
pub const SCOPE_MARKER: &str = "@";
/// Stand-in for [`SCOPE_MARKER`] inside module paths.
pub const SCOPE_ESCAPE: &str = "___";

const MAX_PACKAGE_NAME: usize = 214;

/// Replaces the scope marker so the name can be used in a module path.
pub fn escape_package(name: &str) -> String {
    name.replace(SCOPE_MARKER, SCOPE_ESCAPE)
}

/// Inverse of [`escape_package`] for every name accepted by
/// [`is_valid_package_name`].
pub fn unescape_package(path: &str) -> String {
    path.replace(SCOPE_ESCAPE, SCOPE_MARKER)
}

/// Whether `name` is an npm package name this proxy can represent.
///
/// Accepts `name` and `@scope/name`. Names containing [`SCOPE_ESCAPE`] are
/// rejected since they would not survive a round trip through a module path.
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_PACKAGE_NAME || name.contains(SCOPE_ESCAPE) {
        return false;
    }

    match name.strip_prefix(SCOPE_MARKER) {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, bare)) => is_valid_name_part(scope) && is_valid_name_part(bare),
            None => false,
        },
        None => is_valid_name_part(name),
    }
}

fn is_valid_name_part(part: &str) -> bool {
    if part.is_empty() || part.starts_with('.') || part.starts_with('_') {
        return false;
    }
    part.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Go's case encoding for module paths and versions: every upper-case
/// letter becomes `!` followed by its lower-case form.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`escape_path`]. Returns `None` for strings that are not a
/// valid escaped form: raw upper-case letters, or `!` not followed by a
/// lower-case letter.
pub fn unescape_path(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => out.push(next.to_ascii_uppercase()),
                _ => return None,
            },
            c if c.is_ascii_uppercase() => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Splits a trailing `/vN` major version element off a module path.
///
/// Only `N >= 2` without a leading zero is split, so `/v1` and `/v01` stay
/// part of the prefix. Returns `(prefix, "/vN")`, or `(path, "")`.
pub fn split_path_version(path: &str) -> (&str, &str) {
    let Some(slash) = path.rfind('/') else {
        return (path, "");
    };
    let (prefix, suffix) = path.split_at(slash);
    let Some(digits) = suffix.strip_prefix("/v") else {
        return (path, "");
    };

    let is_major = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0')
        && digits != "1";
    if is_major { (prefix, suffix) } else { (path, "") }
}

/// The Go module a package version is served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    /// Full module path including the major version suffix.
    pub path: String,
    /// `vN`, or empty for v1.
    pub major_suffix: String,
    /// Normalized version.
    pub version: String,
}

impl ModuleIdentity {
    pub fn new(base_path: &str, package: &str, raw_version: &str) -> Self {
        let version = version::normalize(raw_version);
        let major_suffix = version::major_suffix(&version);
        let mut path = format!("{}/{}", base_path.trim_end_matches('/'), escape_package(package));
        if !major_suffix.is_empty() {
            path.push('/');
            path.push_str(&major_suffix);
        }
        Self {
            path,
            major_suffix,
            version,
        }
    }

    pub fn module_version(&self) -> ModuleVersion {
        ModuleVersion::new(self.path.clone(), self.version.clone())
    }
}

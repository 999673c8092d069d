use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

use super::types::{Operation, RequestContext};
use crate::module::{
    escape_package, escape_path, is_valid_package_name, split_path_version, unescape_package,
    unescape_path,
};

struct Route {
    operation: Operation,
    pattern: Regex,
}

static ROUTES: Lazy<Vec<Route>> = Lazy::new(|| {
    [
        (Operation::List, r"^/(?P<module>.+)/@v/list$"),
        (Operation::Info, r"^/(?P<module>.+)/@v/(?P<version>[^/]+)\.info$"),
        (Operation::Manifest, r"^/(?P<module>.+)/@v/(?P<version>[^/]+)\.mod$"),
        (Operation::Archive, r"^/(?P<module>.+)/@v/(?P<version>[^/]+)\.zip$"),
    ]
    .into_iter()
    .map(|(operation, pattern)| Route {
        operation,
        pattern: Regex::new(pattern).expect("route patterns are valid"),
    })
    .collect()
});

/// Outcome of matching a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    /// Not a proxy path, or a path this proxy cannot serve: 404.
    NotFound,
    /// A proxy path that is malformed: 400.
    Invalid(String),
    Matched {
        operation: Operation,
        context: RequestContext,
    },
}

/// Matches `path` against the proxy endpoints below `base_path`.
pub fn resolve(path: &str, base_path: &str) -> RouteMatch {
    let prefix = format!("/{}/", escape_path(base_path));
    if !path.starts_with(&prefix) {
        return RouteMatch::NotFound;
    }

    for route in ROUTES.iter() {
        let Some(captures) = route.pattern.captures(path) else {
            continue;
        };
        let module = captures.name("module").map_or("", |m| m.as_str());
        let version = captures.name("version").map_or("", |m| m.as_str());

        return match decode_context(module, version, base_path) {
            Ok(Some(context)) => RouteMatch::Matched {
                operation: route.operation,
                context,
            },
            Ok(None) => RouteMatch::NotFound,
            Err(reason) => RouteMatch::Invalid(reason),
        };
    }

    RouteMatch::NotFound
}

/// `Ok(None)` when the module path does not name a package below the base.
fn decode_context(module: &str, version: &str, base_path: &str) -> Result<Option<RequestContext>, String> {
    let module = decode_element(module, "module path")?;
    if module == base_path {
        return Ok(None);
    }

    let (mut prefix, mut major) = split_path_version(&module);
    // Go never splits `/v0`, but v0 versions are published under it.
    if major.is_empty()
        && package_below(prefix, base_path).is_none()
        && let Some(stripped) = prefix.strip_suffix("/v0")
    {
        (prefix, major) = (stripped, "/v0");
    }
    let Some(package) = package_below(prefix, base_path) else {
        return Ok(None);
    };

    let version = if version.is_empty() {
        String::new()
    } else {
        decode_element(version, "version")?
    };

    Ok(Some(RequestContext {
        package,
        version,
        path_major: major.trim_start_matches('/').to_string(),
    }))
}

/// The package a module path prefix names, if it is a valid one.
fn package_below(prefix: &str, base_path: &str) -> Option<String> {
    let escaped = prefix.strip_prefix(base_path)?.strip_prefix('/')?;
    let package = unescape_package(escaped);
    (is_valid_package_name(&package) && escape_package(&package) == escaped).then_some(package)
}

fn decode_element(raw: &str, what: &str) -> Result<String, String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| format!("{what} is not valid UTF-8"))?;
    unescape_path(&decoded).ok_or_else(|| format!("invalid escaped {what} {decoded:?}"))
}

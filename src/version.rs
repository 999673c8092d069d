//! Version strings as the Go toolchain sees them.
//!
//! npm publishes bare semver strings (`3.3.3`); Go wants them with a `v`
//! prefix (`v3.3.3`). Everything the proxy serves goes through [`normalize`],
//! and everything it sorts goes through [`compare`].

use std::cmp::Ordering;

use semver::Version;

pub mod range;

pub use range::VersionRange;

const PREFIX: char = 'v';

/// Returns the canonical `v`-prefixed form of `raw`.
///
/// Idempotent: normalizing an already normalized string returns it unchanged.
pub fn normalize(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with(PREFIX) {
        raw.to_string()
    } else {
        format!("{PREFIX}{raw}")
    }
}

/// Parses a raw or normalized version string as semver.
pub fn parse(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    Version::parse(raw.strip_prefix(PREFIX).unwrap_or(raw)).ok()
}

/// Semver precedence of two versions, raw or normalized.
///
/// Build metadata does not take part. Strings that fail to parse sort
/// before every valid version and are equal to each other.
pub fn precedence(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => (a.major, a.minor, a.patch)
            .cmp(&(b.major, b.minor, b.patch))
            .then_with(|| a.pre.cmp(&b.pre)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Total order used for version lists: precedence, then the strings
/// themselves so that equal-precedence versions sort stably.
pub fn compare(a: &str, b: &str) -> Ordering {
    precedence(a, b).then_with(|| a.cmp(b))
}

/// Major version number, if `raw` is valid semver.
pub fn major(raw: &str) -> Option<u64> {
    parse(raw).map(|v| v.major)
}

/// The Go major version path element for `raw`: empty for v1 and for
/// unparseable versions, `vN` otherwise.
///
/// v0 keeps its `v0` suffix, so every npm package lives under `.../v0` until
/// its first stable release.
pub fn major_suffix(raw: &str) -> String {
    match major(raw) {
        Some(1) | None => String::new(),
        Some(n) => format!("{PREFIX}{n}"),
    }
}

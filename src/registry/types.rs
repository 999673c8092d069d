use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::version::{self, VersionRange};

/// A declared dependency: a package name and the range it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version_range: String,
}

/// Where a version's tarball lives and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dist {
    /// Hex encoded SHA-1 of the tarball.
    pub shasum: String,
    pub tarball: String,
    /// Subresource integrity string, e.g. `sha512-<base64>`.
    #[serde(default)]
    pub integrity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub name: String,
    /// Normalized version string.
    pub version: String,
    /// Version as the registry spells it.
    pub raw_version: String,
    pub dependencies: Vec<Dependency>,
    pub dist: Dist,
    /// Publish time, known only from the full package document.
    pub published: Option<DateTime<Utc>>,
}

impl PackageVersion {
    pub fn major_suffix(&self) -> String {
        version::major_suffix(&self.version)
    }
}

/// A package and all of its published versions, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// Normalized `latest` dist tag.
    pub latest: Option<String>,
    pub versions: Vec<PackageVersion>,
    /// Last time the package document changed.
    pub modified: Option<DateTime<Utc>>,
}

impl Package {
    /// Decodes an abbreviated or full registry document.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let document: PackageDocument = serde_json::from_slice(body)?;
        Ok(document.into_package())
    }

    /// Looks up a version by its normalized (or raw) string.
    pub fn version(&self, version: &str) -> Option<&PackageVersion> {
        let wanted = version::normalize(version);
        self.versions.iter().find(|v| v.version == wanted)
    }

    pub fn require_version(&self, version: &str) -> Result<&PackageVersion> {
        self.version(version).ok_or_else(|| Error::VersionNotFound {
            package: self.name.clone(),
            version: version.to_string(),
        })
    }

    /// The version the `latest` tag points at, else the highest version.
    pub fn latest_version(&self) -> Option<&PackageVersion> {
        self.latest
            .as_deref()
            .and_then(|latest| self.version(latest))
            .or_else(|| self.versions.last())
    }

    /// Highest version satisfying an npm range.
    ///
    /// `latest` resolves to [`Package::latest_version`]. Other dist tags are
    /// not kept, so they resolve to `None` like any other non-range form.
    pub fn best_match(&self, range: &str) -> Option<&PackageVersion> {
        let range = range.trim();
        if range == "latest" {
            return self.latest_version();
        }
        let range = VersionRange::parse(range)?;
        self.versions.iter().rev().find(|v| {
            version::parse(&v.version).is_some_and(|parsed| range.matches(&parsed))
        })
    }

    /// Normalized versions, ascending.
    pub fn version_list(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|v| v.version.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct PackageDocument {
    name: String,
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, VersionDocument>,
    /// Full documents only. Values are timestamps, except for the
    /// `unpublished` entry which is an object.
    #[serde(default)]
    time: HashMap<String, serde_json::Value>,
    /// Abbreviated documents only.
    #[serde(default)]
    modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<serde_json::Value>,
    dist: Dist,
}

impl PackageDocument {
    fn into_package(self) -> Package {
        let times: HashMap<String, DateTime<Utc>> = self
            .time
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), parse_time(value.as_str()?)?)))
            .collect();

        let mut versions: Vec<PackageVersion> = self
            .versions
            .into_iter()
            .map(|(key, doc)| {
                let raw = doc.version.unwrap_or(key);
                PackageVersion {
                    name: doc.name.unwrap_or_else(|| self.name.clone()),
                    published: times.get(&raw).copied(),
                    version: version::normalize(&raw),
                    dependencies: dependencies(&self.name, doc.dependencies),
                    dist: doc.dist,
                    raw_version: raw,
                }
            })
            .collect();
        // Map iteration order is unspecified.
        versions.sort_by(|a, b| {
            version::precedence(&a.version, &b.version).then_with(|| a.raw_version.cmp(&b.raw_version))
        });

        let modified = self
            .modified
            .as_deref()
            .and_then(parse_time)
            .or_else(|| times.get("modified").copied());

        Package {
            latest: self.dist_tags.get("latest").map(|v| version::normalize(v)),
            name: self.name,
            versions,
            modified,
        }
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Dependency maps are sorted by name. Entries whose range is not a string
/// are dropped; some old documents carry arrays or nulls here.
fn dependencies(package: &str, raw: Option<serde_json::Value>) -> Vec<Dependency> {
    let map = match raw {
        None | Some(serde_json::Value::Null) => return Vec::new(),
        Some(serde_json::Value::Object(map)) => map,
        Some(other) => {
            warn!(package, value = %other, "ignoring malformed dependency map");
            return Vec::new();
        }
    };

    map.into_iter()
        .filter_map(|(name, range)| match range {
            serde_json::Value::String(range) => Some((name, range)),
            _ => None,
        })
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(name, version_range)| Dependency {
            name,
            version_range,
        })
        .collect()
}

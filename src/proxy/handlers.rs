//! One handler per Go module proxy endpoint.

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::ModProxy;
use super::response::{Failure, respond_archive, respond_json, respond_text};
use super::types::RequestContext;
use crate::error::{Error, Result};
use crate::module::ModuleIdentity;
use crate::registry::{Dependency, Package, PackageVersion};

type Outcome = Result<Response, Failure>;

/// `$module/@v/list`: every published version, ascending.
pub async fn list(proxy: &ModProxy, ctx: &RequestContext) -> Outcome {
    let package = proxy
        .registry
        .fetch_package(&ctx.package)
        .await
        .map_err(Failure::at("fetching package"))?;

    let body = package.version_list().collect::<Vec<_>>().join("\n");
    Ok(respond_text(StatusCode::OK, body))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct VersionInfo<'a> {
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
}

/// `$module/@v/$version.info`
pub async fn info(proxy: &ModProxy, ctx: &RequestContext) -> Outcome {
    // Only the full document carries publish times.
    let package = proxy
        .registry
        .fetch_package_document(&ctx.package)
        .await
        .map_err(Failure::at("fetching package version"))?;
    let version = requested_version(&package, ctx).map_err(Failure::at("fetching package version"))?;

    let body = serde_json::to_string(&VersionInfo {
        version: &version.version,
        time: version.published,
    })
    .map_err(|err| Failure {
        what: "encoding version info",
        error: err.into(),
    })?;
    Ok(respond_json(StatusCode::OK, body))
}

/// `$module/@v/$version.mod`: a synthetic go.mod requiring one module per
/// npm dependency.
pub async fn manifest(proxy: &ModProxy, ctx: &RequestContext) -> Outcome {
    let package = proxy
        .registry
        .fetch_package(&ctx.package)
        .await
        .map_err(Failure::at("fetching package version"))?;
    let version = requested_version(&package, ctx).map_err(Failure::at("fetching package version"))?;

    let requires = resolve_requirements(proxy, &version.dependencies)
        .await
        .map_err(Failure::at("resolving dependencies"))?;

    let identity = ModuleIdentity::new(proxy.base_path(), &ctx.package, &version.version);
    let body = render_go_mod(&identity.path, &proxy.config.module.go_version, &requires);
    Ok(respond_text(StatusCode::OK, body))
}

/// `$module/@v/$version.zip`
pub async fn archive(proxy: &ModProxy, ctx: &RequestContext) -> Outcome {
    let package = proxy
        .registry
        .fetch_package(&ctx.package)
        .await
        .map_err(Failure::at("fetching package version"))?;
    let mut version = requested_version(&package, ctx)
        .map_err(Failure::at("fetching package version"))?
        .clone();
    // The archive prefix must echo the requested module path.
    version.name.clone_from(&ctx.package);

    let last_modified = version
        .published
        .or(package.modified)
        .unwrap_or_else(Utc::now);

    // Detached so a client disconnect cannot cancel the download or leak the
    // staging directory.
    let pipeline = proxy.pipeline.clone();
    let handle = tokio::spawn(async move { pipeline.build(version).await })
        .await
        .map_err(|err| Failure {
            what: "creating module zip",
            error: Error::Task(err.to_string()),
        })?
        .map_err(Failure::at("creating module zip"))?;

    Ok(respond_archive(handle, last_modified))
}

/// The requested version, which must live under the requested major path.
fn requested_version<'a>(package: &'a Package, ctx: &RequestContext) -> Result<&'a PackageVersion> {
    let version = package.require_version(&ctx.version)?;
    if version.major_suffix() != ctx.path_major {
        debug!(
            package = %package.name,
            version = %version.version,
            path_major = %ctx.path_major,
            "version requested under the wrong major path"
        );
        return Err(Error::VersionNotFound {
            package: package.name.clone(),
            version: ctx.version.clone(),
        });
    }
    Ok(version)
}

/// Resolves each dependency to a `(module path, version)` requirement, in
/// declaration order.
async fn resolve_requirements(proxy: &ModProxy, dependencies: &[Dependency]) -> Result<Vec<(String, String)>> {
    let lookups = dependencies.iter().map(|dependency| async move {
        let wrap = |source: Error| Error::Dependency {
            name: dependency.name.clone(),
            source: Box::new(source),
        };

        let package = proxy
            .registry
            .fetch_package(&dependency.name)
            .await
            .map_err(wrap)?;

        let resolved = match package.best_match(&dependency.version_range) {
            Some(resolved) => resolved,
            None => {
                warn!(
                    dependency = %dependency.name,
                    range = %dependency.version_range,
                    "no version satisfies the range, falling back to latest"
                );
                package.latest_version().ok_or_else(|| {
                    wrap(Error::VersionNotFound {
                        package: dependency.name.clone(),
                        version: dependency.version_range.clone(),
                    })
                })?
            }
        };

        let identity = ModuleIdentity::new(proxy.base_path(), &dependency.name, &resolved.version);
        Ok::<_, Error>((identity.path, identity.version))
    });

    try_join_all(lookups).await
}

/// Renders a go.mod file.
pub fn render_go_mod(module: &str, go_version: &str, requires: &[(String, String)]) -> String {
    let mut out = format!("module {module}\n\ngo {go_version}\n");
    if !requires.is_empty() {
        out.push_str("\nrequire (\n");
        for (path, version) in requires {
            out.push_str(&format!("\t{path} {version}\n"));
        }
        out.push_str(")\n");
    }
    out
}

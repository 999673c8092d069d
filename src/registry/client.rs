use reqwest::StatusCode;
use tracing::debug;

use super::types::{Package, PackageVersion};
use crate::error::{Error, Result};
use crate::module::is_valid_package_name;
use crate::upstream::UpstreamClient;

/// Accept header for the abbreviated ("corgi") document: versions,
/// dependencies and dist records only.
pub const ABBREVIATED_METADATA: &str = "application/vnd.npm.install-v1+json";
/// Accept header for the full document, which adds publish times.
pub const FULL_METADATA: &str = "application/json";

#[derive(Clone)]
pub struct RegistryClient {
    upstream: UpstreamClient,
}

impl RegistryClient {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Fetches the abbreviated document for `name`.
    pub async fn fetch_package(&self, name: &str) -> Result<Package> {
        self.fetch(name, ABBREVIATED_METADATA).await
    }

    /// Fetches the full document for `name`, including publish times.
    pub async fn fetch_package_document(&self, name: &str) -> Result<Package> {
        self.fetch(name, FULL_METADATA).await
    }

    /// Fetches one version of `name`. The version may be raw or normalized.
    pub async fn fetch_package_version(&self, name: &str, version: &str) -> Result<PackageVersion> {
        let package = self.fetch_package(name).await?;
        package.require_version(version).cloned()
    }

    async fn fetch(&self, name: &str, accept: &str) -> Result<Package> {
        if !is_valid_package_name(name) {
            return Err(Error::InvalidRequest(format!("invalid package name {name:?}")));
        }

        let url = self.upstream.package_url(name);
        let response = self.upstream.get(&url, accept).await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(Error::PackageNotFound(name.to_string())),
            status if !status.is_success() => {
                return Err(Error::Upstream(format!("registry returned {status} for {url}")));
            }
            _ => {}
        }

        let body = response.bytes().await?;
        let package = Package::from_json(&body)?;
        debug!(package = %package.name, versions = package.versions.len(), "fetched package metadata");
        Ok(package)
    }
}

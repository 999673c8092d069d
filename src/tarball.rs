//! Downloads package tarballs and verifies them against their dist record.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use sha1::{Digest, Sha1};
use sha2::Sha512;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registry::Dist;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct TarballFetcher {
    upstream: UpstreamClient,
}

impl TarballFetcher {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Streams the tarball described by `dist` into `destination`.
    ///
    /// The file only remains on disk if its SHA-1 matches `dist.shasum` and,
    /// when the record carries one, its SHA-512 matches the integrity
    /// string. Returns the number of bytes written.
    pub async fn fetch(&self, dist: &Dist, destination: &Path) -> Result<u64> {
        let response = self.upstream.download(&dist.tarball).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "bad status {status} downloading {}",
                dist.tarball
            )));
        }

        match write_verified(response, dist, destination).await {
            Ok(written) => {
                debug!(url = %dist.tarball, bytes = written, "tarball verified");
                Ok(written)
            }
            Err(err) => {
                if let Err(remove_err) = fs::remove_file(destination).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %destination.display(), error = %remove_err, "failed to remove rejected tarball");
                }
                Err(err)
            }
        }
    }
}

async fn write_verified(response: reqwest::Response, dist: &Dist, destination: &Path) -> Result<u64> {
    let mut file = File::create(destination)
        .await
        .map_err(|err| Error::io(format!("creating {}", destination.display()), err))?;

    let expected_sha512 = dist.integrity.as_deref().and_then(sha512_digest);
    let mut sha1 = Sha1::new();
    let mut sha512 = expected_sha512.map(|_| Sha512::new());
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sha1.update(&chunk);
        if let Some(hasher) = sha512.as_mut() {
            hasher.update(&chunk);
        }
        file.write_all(&chunk)
            .await
            .map_err(|err| Error::io(format!("writing {}", destination.display()), err))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| Error::io(format!("flushing {}", destination.display()), err))?;

    let actual = hex::encode(sha1.finalize());
    if actual != dist.shasum {
        return Err(Error::ChecksumMismatch {
            url: dist.tarball.clone(),
            expected: dist.shasum.clone(),
            actual,
        });
    }

    if let (Some(expected), Some(hasher)) = (expected_sha512, sha512) {
        let actual = STANDARD.encode(hasher.finalize());
        if actual != expected {
            return Err(Error::ChecksumMismatch {
                url: dist.tarball.clone(),
                expected: format!("sha512-{expected}"),
                actual: format!("sha512-{actual}"),
            });
        }
    }

    Ok(written)
}

/// Extracts the base64 SHA-512 digest from a subresource integrity string.
/// Other algorithms are ignored; SHA-1 is already covered by the shasum.
fn sha512_digest(integrity: &str) -> Option<&str> {
    integrity
        .split_whitespace()
        .find_map(|entry| entry.strip_prefix("sha512-"))
        .map(|digest| digest.split('?').next().unwrap_or(digest))
}

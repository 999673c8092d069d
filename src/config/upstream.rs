use crate::config::reliability::ReliabilityConfig;
use serde::Deserialize;
use url::Url;

/// The npm registry packages are proxied from.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url", with = "serde_url")]
    pub url: Url,
    /// Timeout for metadata requests.
    #[serde(default = "UpstreamConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout for a whole tarball download.
    #[serde(default = "UpstreamConfig::default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "UpstreamConfig::default_connection_pool_size")]
    pub connection_pool_size: usize,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

impl UpstreamConfig {
    fn default_timeout_secs() -> u64 {
        10
    }

    fn default_download_timeout_secs() -> u64 {
        300
    }

    fn default_connection_pool_size() -> usize {
        32
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: Self::default_timeout_secs(),
            download_timeout_secs: Self::default_download_timeout_secs(),
            connection_pool_size: Self::default_connection_pool_size(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

fn default_upstream_url() -> Url {
    Url::parse("https://registry.npmjs.org/").expect("default upstream url is valid")
}

mod serde_url {
    use serde::{Deserialize, Deserializer};
    use url::Url;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Url, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Url::parse(&s).map_err(serde::de::Error::custom)
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub mod logging;
pub mod module;
pub mod reliability;
pub mod server;
pub mod storage;
pub mod upstream;

#[cfg(test)]
mod tests;

pub use logging::LoggingConfig;
pub use module::ModuleConfig;
pub use reliability::{BackoffStrategy, CircuitBreakerConfig, ReliabilityConfig, RetryConfig};
pub use server::ServerConfig;
pub use storage::StorageConfig;
pub use upstream::UpstreamConfig;

const DEFAULT_CONFIG_FILE: &str = "npmgoproxy.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub module: ModuleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the configuration was read from, `None` when defaults were used.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Loads `path`, or defaults when it does not exist. Nothing is logged
    /// here since tracing is usually not set up yet; check [`Config::source`].
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let candidate = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if candidate.exists() {
            let raw = fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read config {}", candidate.display()))?;
            let mut config: Config = toml::from_str(&raw)
                .with_context(|| format!("invalid config {}", candidate.display()))?;
            config
                .storage
                .normalize_paths(candidate.parent().unwrap_or(Path::new(".")));
            config.source = Some(candidate);
            Ok(config)
        } else {
            let mut config = Config::default();
            let cwd = std::env::current_dir().context("reading current directory")?;
            config.storage.normalize_paths(&cwd);
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let scheme = self.upstream.url.scheme();
        if scheme != "https" && scheme != "http" {
            bail!("unsupported upstream scheme {}", self.upstream.url);
        }
        if self.upstream.timeout_secs == 0 || self.upstream.download_timeout_secs == 0 {
            bail!("upstream timeouts must be greater than zero");
        }
        if self.server.workers == 0 {
            bail!("server.workers must be at least 1");
        }
        gomodzip::check_module_path(&self.module.base_path)
            .with_context(|| format!("invalid module.base_path {:?}", self.module.base_path))?;
        if !ModuleConfig::is_valid_go_version(&self.module.go_version) {
            bail!("invalid module.go_version {:?}", self.module.go_version);
        }
        if let Some(dir) = self.storage.staging_dir.as_ref().filter(|dir| dir.is_file()) {
            bail!("storage.staging_dir {} is a file", dir.display());
        }
        Ok(())
    }
}

use serde::Deserialize;

/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// One JSON object per line instead of human readable output.
    #[serde(default)]
    pub json: bool,
    /// Include the module target in each line.
    #[serde(default)]
    pub targets: bool,
    /// OTLP/HTTP endpoint to export spans to.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LoggingConfig::default_level(),
            json: false,
            targets: false,
            otlp_endpoint: None,
        }
    }
}

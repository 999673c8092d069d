use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Fibonacci,
    Constant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retry transient registry failures
    #[serde(default = "RetryConfig::default_enabled")]
    pub enabled: bool,
    /// Attempts per request, including the first one
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff duration (milliseconds)
    #[serde(default = "RetryConfig::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration (seconds)
    #[serde(default = "RetryConfig::default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter)
    #[serde(default = "RetryConfig::default_jitter_factor")]
    pub jitter_factor: f64,
}

impl RetryConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_initial_backoff_ms() -> u64 {
        100
    }

    fn default_max_backoff_secs() -> u64 {
        2
    }

    fn default_jitter_factor() -> f64 {
        1.0
    }

    /// Attempts per request once retries are taken into account.
    pub fn attempts(&self) -> u8 {
        if self.enabled {
            self.max_attempts.clamp(1, u32::from(u8::MAX)) as u8
        } else {
            1
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_attempts: Self::default_max_attempts(),
            initial_backoff_ms: Self::default_initial_backoff_ms(),
            max_backoff_secs: Self::default_max_backoff_secs(),
            backoff_strategy: BackoffStrategy::default(),
            jitter_factor: Self::default_jitter_factor(),
        }
    }
}

/// Trips after repeated 5xx or network failures so a failing registry is
/// not hammered by every incoming request.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "CircuitBreakerConfig::default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "CircuitBreakerConfig::default_failure_window_secs")]
    pub failure_window_secs: f64,
    #[serde(default = "CircuitBreakerConfig::default_half_open_timeout_secs")]
    pub half_open_timeout_secs: f64,
    #[serde(default = "CircuitBreakerConfig::default_success_threshold")]
    pub success_threshold: usize,
}

impl CircuitBreakerConfig {
    fn default_failure_threshold() -> usize {
        5
    }

    fn default_failure_window_secs() -> f64 {
        60.0
    }

    fn default_half_open_timeout_secs() -> f64 {
        30.0
    }

    fn default_success_threshold() -> usize {
        2
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            failure_window_secs: Self::default_failure_window_secs(),
            half_open_timeout_secs: Self::default_half_open_timeout_secs(),
            success_threshold: Self::default_success_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

use breaker_machines::CircuitBreaker;
use chrono_machines::{BackoffPolicy, BackoffStrategy, ConstantBackoff, ExponentialBackoff, FibonacciBackoff};
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BackoffStrategy as ConfigBackoffStrategy, UpstreamConfig};
use crate::error::{Error, Result};

const UA: &str = concat!("npmgoproxy/", env!("CARGO_PKG_VERSION"));

/// Characters kept as-is when a package name is placed in a registry URL.
/// Everything else, the scope separator included, is percent-encoded.
const PACKAGE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'@')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTTP client for the npm registry with retry, circuit breaker, and tracing.
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base: Url,
    download_timeout: Duration,
    attempts: u8,
    backoff: BackoffPolicy,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let breaker_config = &config.reliability.circuit_breaker;
        let breaker = CircuitBreaker::builder("npm_registry")
            .failure_threshold(breaker_config.failure_threshold)
            .failure_window_secs(breaker_config.failure_window_secs)
            .half_open_timeout_secs(breaker_config.half_open_timeout_secs)
            .success_threshold(breaker_config.success_threshold)
            .jitter_factor(0.1)
            .on_open(|name| {
                warn!(circuit = %name, "Circuit breaker opened - registry is failing");
            })
            .on_close(|name| {
                info!(circuit = %name, "Circuit breaker closed - registry recovered");
            })
            .on_half_open(|name| {
                info!(circuit = %name, "Circuit breaker half-open - testing registry");
            })
            .build();

        let retry = &config.reliability.retry;
        let max_delay_ms = retry.max_backoff_secs * 1000;
        let jitter = retry.jitter_factor;
        let attempts = retry.attempts();

        let backoff: BackoffPolicy = match retry.backoff_strategy {
            ConfigBackoffStrategy::Exponential => ExponentialBackoff::new()
                .base_delay_ms(retry.initial_backoff_ms)
                .max_delay_ms(max_delay_ms)
                .max_attempts(attempts)
                .jitter_factor(jitter)
                .into(),
            ConfigBackoffStrategy::Fibonacci => FibonacciBackoff::new()
                .base_delay_ms(retry.initial_backoff_ms)
                .max_delay_ms(max_delay_ms)
                .max_attempts(attempts)
                .jitter_factor(jitter)
                .into(),
            ConfigBackoffStrategy::Constant => ConstantBackoff::new()
                .delay_ms(retry.initial_backoff_ms)
                .max_attempts(attempts)
                .jitter_factor(jitter)
                .into(),
        };

        let http = Client::builder()
            .user_agent(UA)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.connection_pool_size)
            .build()?;

        info!(
            url = %config.url,
            timeout_secs = config.timeout_secs,
            download_timeout_secs = config.download_timeout_secs,
            strategy = ?retry.backoff_strategy,
            max_attempts = attempts,
            "Upstream client initialized",
        );

        Ok(Self {
            http,
            base: config.url.clone(),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            attempts,
            backoff,
            breaker: Arc::new(Mutex::new(breaker)),
        })
    }

    /// Metadata URL of `package`. Scoped names keep their `@` and have the
    /// separator encoded, e.g. `@vue%2Freactivity`.
    pub fn package_url(&self, package: &str) -> String {
        let encoded = utf8_percent_encode(package, PACKAGE_NAME).to_string();
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), encoded)
    }

    /// GET with the metadata timeout.
    pub async fn get(&self, url: &str, accept: &str) -> Result<Response> {
        self.send(url, accept, None).await
    }

    /// GET with the download timeout, for tarballs.
    pub async fn download(&self, url: &str) -> Result<Response> {
        self.send(url, "*/*", Some(self.download_timeout)).await
    }

    async fn send(&self, url: &str, accept: &str, timeout: Option<Duration>) -> Result<Response> {
        if self.breaker.lock().is_open() {
            return Err(Error::Upstream(
                "circuit breaker is open - registry is currently unavailable".to_string(),
            ));
        }

        let mut attempt: u8 = 0;
        let mut rng = SmallRng::from_os_rng();
        let start_time = Instant::now();

        loop {
            attempt += 1;

            let mut request = self.http.get(url).header(ACCEPT, accept);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) if response.status().is_server_error() && attempt < self.attempts => {
                    debug!(url, status = %response.status(), attempt, "retrying registry request");
                    self.pause(attempt, &mut rng).await;
                }
                Ok(response) => {
                    let duration = start_time.elapsed().as_secs_f64();
                    if response.status().is_server_error() {
                        let mut breaker = self.breaker.lock();
                        breaker.record_failure(duration);
                        breaker.check_and_trip();
                    } else {
                        // 4xx is an answer, not an outage.
                        self.breaker.lock().record_success(duration);
                    }
                    return Ok(response);
                }
                Err(err) if attempt < self.attempts && is_retryable(&err) => {
                    debug!(url, error = %err, attempt, "retrying registry request");
                    self.pause(attempt, &mut rng).await;
                }
                Err(err) => {
                    let duration = start_time.elapsed().as_secs_f64();
                    let mut breaker = self.breaker.lock();
                    breaker.record_failure(duration);
                    breaker.check_and_trip();
                    return Err(Error::Upstream(format!("request to {url} failed: {err}")));
                }
            }
        }
    }

    async fn pause(&self, attempt: u8, rng: &mut SmallRng) {
        if let Some(delay_ms) = self.backoff.delay(attempt, rng) {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

use super::*;
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

// === DEFAULT VALUE TESTS ===

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8072);
    assert_eq!(config.server.workers, num_cpus::get());
    assert!(config.server.expose_errors);
    assert_eq!(config.upstream.url.as_str(), "https://registry.npmjs.org/");
    assert_eq!(config.module.base_path, "gohugo.io/npmjs");
    assert_eq!(config.module.go_version, "1.17");
    assert!(config.storage.staging_dir.is_none());
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
}

#[test]
fn test_default_upstream_config() {
    let upstream = UpstreamConfig::default();
    assert_eq!(upstream.timeout_secs, 10);
    assert_eq!(upstream.download_timeout_secs, 300);
    assert!(upstream.reliability.retry.enabled);
    assert_eq!(upstream.reliability.retry.max_attempts, 3);
    assert_eq!(
        upstream.reliability.retry.backoff_strategy,
        BackoffStrategy::Exponential
    );
    assert_eq!(upstream.reliability.circuit_breaker.failure_threshold, 5);
}

#[test]
fn test_default_config_is_valid() {
    Config::default().validate().unwrap();
}

// === TOML PARSING TESTS ===

#[test]
fn test_parse_minimal_config() {
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 8080
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.module.base_path, "gohugo.io/npmjs");
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 3000
        workers = 4
        expose_errors = false

        [upstream]
        url = "https://npm.example.com/registry/"
        timeout_secs = 5
        download_timeout_secs = 60

        [upstream.reliability.retry]
        enabled = true
        max_attempts = 5
        initial_backoff_ms = 250
        backoff_strategy = "fibonacci"
        jitter_factor = 0.5

        [upstream.reliability.circuit_breaker]
        failure_threshold = 10

        [module]
        base_path = "example.com/npm"
        go_version = "1.21"

        [storage]
        staging_dir = "/var/tmp/npmgoproxy"

        [logging]
        level = "debug"
        json = true
    "#;

    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.workers, 4);
    assert!(!config.server.expose_errors);
    assert_eq!(config.upstream.url.as_str(), "https://npm.example.com/registry/");
    assert_eq!(config.upstream.timeout_secs, 5);
    assert_eq!(config.upstream.download_timeout_secs, 60);

    let retry = &config.upstream.reliability.retry;
    assert_eq!(retry.max_attempts, 5);
    assert_eq!(retry.initial_backoff_ms, 250);
    assert_eq!(retry.backoff_strategy, BackoffStrategy::Fibonacci);
    assert_eq!(retry.jitter_factor, 0.5);
    assert_eq!(config.upstream.reliability.circuit_breaker.failure_threshold, 10);
    assert_eq!(config.upstream.reliability.circuit_breaker.success_threshold, 2);

    assert_eq!(config.module.base_path, "example.com/npm");
    assert_eq!(config.module.go_version, "1.21");
    assert_eq!(
        config.storage.staging_dir,
        Some(PathBuf::from("/var/tmp/npmgoproxy"))
    );
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_parse_empty_config() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.port, 8072);
    assert_eq!(config.upstream.url.as_str(), "https://registry.npmjs.org/");
}

#[test]
fn test_retry_attempts() {
    let mut retry = RetryConfig::default();
    assert_eq!(retry.attempts(), 3);
    retry.max_attempts = 0;
    assert_eq!(retry.attempts(), 1);
    retry.max_attempts = 1_000;
    assert_eq!(retry.attempts(), u8::MAX);
    retry.enabled = false;
    assert_eq!(retry.attempts(), 1);
}

// === CONFIG FILE LOADING TESTS ===

#[test]
fn test_load_config_from_existing_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("npmgoproxy.toml");

    let toml_content = r#"
        [server]
        host = "127.0.0.1"
        port = 4000

        [storage]
        staging_dir = "staging"
    "#;

    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(config_path.clone())).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.source, Some(config_path));

    let expected_staging = temp_dir.path().join("staging");
    assert_eq!(config.storage.staging_dir, Some(expected_staging));
}

#[test]
fn test_load_config_nonexistent_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.toml");

    let config = Config::load(Some(nonexistent)).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8072);
    assert_eq!(config.source, None);
}

#[test]
fn test_load_config_invalid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"invalid { toml content").unwrap();
    temp_file.flush().unwrap();

    let result = Config::load(Some(temp_file.path().to_path_buf()));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("invalid config"));
}

#[test]
fn test_load_config_invalid_url() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("npmgoproxy.toml");
    fs::write(&config_path, "[upstream]\nurl = \"not a url\"\n").unwrap();

    assert!(Config::load(Some(config_path)).is_err());
}

// === PATH NORMALIZATION TESTS ===

#[test]
fn test_staging_dir_normalization_relative() {
    let mut storage = StorageConfig {
        staging_dir: Some(PathBuf::from("staging")),
    };
    storage.normalize_paths(Path::new("/srv/npmgoproxy"));
    assert_eq!(
        storage.staging_dir,
        Some(PathBuf::from("/srv/npmgoproxy/staging"))
    );
}

#[test]
fn test_staging_dir_normalization_absolute() {
    let mut storage = StorageConfig {
        staging_dir: Some(PathBuf::from("/tmp/staging")),
    };
    storage.normalize_paths(Path::new("/srv/npmgoproxy"));
    assert_eq!(storage.staging_dir, Some(PathBuf::from("/tmp/staging")));
}

#[test]
fn test_staging_dir_unset_stays_unset() {
    let mut storage = StorageConfig::default();
    storage.normalize_paths(Path::new("/srv/npmgoproxy"));
    assert!(storage.staging_dir.is_none());
    storage.ensure_directories().unwrap();
}

#[test]
fn test_ensure_directories_creates_staging_dir() {
    let temp_dir = tempdir().unwrap();
    let storage = StorageConfig {
        staging_dir: Some(temp_dir.path().join("a/b")),
    };
    storage.ensure_directories().unwrap();
    assert!(temp_dir.path().join("a/b").is_dir());
}

// === VALIDATION TESTS ===

#[test]
fn test_validate_http_upstream() {
    let toml = r#"
        [upstream]
        url = "http://localhost:4873/"
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_invalid_scheme() {
    let toml = r#"
        [upstream]
        url = "ftp://registry.example.com/"
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("unsupported upstream scheme"));
}

#[test]
fn test_validate_invalid_base_path() {
    let toml = r#"
        [module]
        base_path = "npmjs"
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("module.base_path"));
}

#[test]
fn test_validate_go_version() {
    assert!(ModuleConfig::is_valid_go_version("1.17"));
    assert!(ModuleConfig::is_valid_go_version("1.21.4"));
    assert!(!ModuleConfig::is_valid_go_version("2.0"));
    assert!(!ModuleConfig::is_valid_go_version("1"));
    assert!(!ModuleConfig::is_valid_go_version("1.x"));
    assert!(!ModuleConfig::is_valid_go_version("1..2"));

    let mut config = Config::default();
    config.module.go_version = "go1.17".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_zero_timeout() {
    let mut config = Config::default();
    config.upstream.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_zero_workers() {
    let mut config = Config::default();
    config.server.workers = 0;
    assert!(config.validate().is_err());
}

// === INTEGRATION TESTS ===

#[test]
fn test_full_workflow_load_validate() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("npmgoproxy.toml");

    let toml_content = r#"
        [server]
        port = 9000

        [upstream]
        url = "https://registry.npmjs.org/"

        [module]
        base_path = "gohugo.io/npmjs"

        [storage]
        staging_dir = "tmp"
    "#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(config_path)).unwrap();
    config.validate().unwrap();
    config.storage.ensure_directories().unwrap();
    assert!(temp_dir.path().join("tmp").is_dir());
}

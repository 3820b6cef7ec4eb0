use std::{fs, time::Duration};

use auditoria_config::{
    BusBackend, ConfigGuardRailError, ConfigLoadError, ConfigLoader,
    DurableBackend, FastBackend, sources::EnvConfig,
};
use auditoria_core::LogIdStrategy;
use tempfile::TempDir;

const SAMPLE: &str = r#"
[server]
port = 4000

[bus]
backend = "memory"
topic = "auditoria-dev"
from_earliest = false

[bus.retry]
max_attempts = 5
base_delay = "200ms"
multiplier = 2.0
max_delay = "3s"

[fast_store]
backend = "memory"

[durable_store]
backend = "fs"
root = "/var/lib/auditoria"
prefix = "logs"

[persistence]
write_timeout = "2s"
write_attempts = 3
write_retry_delay = "1s"
log_id = "offset"
"#;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("auditoria.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn loads_every_section_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap();
    let config = load.config;

    assert_eq!(config.server.port, 4000);
    assert_eq!(config.bus.backend, BusBackend::Memory);
    assert_eq!(config.bus.topic, "auditoria-dev");
    assert!(!config.bus.from_earliest);
    assert_eq!(config.bus.retry.max_attempts, 5);
    assert_eq!(config.bus.retry.delay_after(3), Duration::from_millis(800));
    assert_eq!(config.bus.retry.delay_after(10), Duration::from_secs(3));
    assert_eq!(config.fast_store.backend, FastBackend::Memory);
    assert_eq!(config.durable_store.backend, DurableBackend::Fs);
    assert_eq!(config.durable_store.prefix, "logs");
    assert_eq!(config.persistence.write_policy().max_attempts, 3);
    assert_eq!(config.persistence.write_timeout, Duration::from_secs(2));
    assert_eq!(
        config.persistence.write_policy().delay_after(2),
        Duration::from_secs(2)
    );
    assert_eq!(config.persistence.log_id, LogIdStrategy::Offset);
    assert_eq!(config.metadata.config_path.as_deref(), Some(path.as_path()));

    // In-memory stores and bus are allowed but flagged.
    assert!(!load.warnings.is_empty());
}

#[test]
fn reference_environment_is_enough_without_a_file() {
    let env = EnvConfig {
        kafka_broker: Some("kafka:9092".into()),
        redis_host: Some("redis".into()),
        bucket_name: Some("auditoria-logs".into()),
        aws_region: Some("us-east-1".into()),
        server_port: Some("8080".into()),
        ..EnvConfig::default()
    };

    let load = ConfigLoader::new().load_with_env(env, false).unwrap();
    let config = load.config;

    assert_eq!(config.bus.backend, BusBackend::Kafka);
    assert_eq!(config.bus.brokers, "kafka:9092");
    assert_eq!(config.fast_store.redis_url, "redis://redis:6379");
    assert_eq!(config.durable_store.s3_settings().bucket, "auditoria-logs");
    assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
    assert!(
        load.warnings
            .iter()
            .any(|warning| warning.message.contains("auditoria.toml"))
    );
}

#[test]
fn s3_without_bucket_is_rejected() {
    let err = ConfigLoader::new()
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::MissingBucket)
    ));
}

#[test]
fn zero_retry_attempts_are_rejected() {
    let env = EnvConfig {
        bucket_name: Some("b".into()),
        bus_retry_attempts: Some("0".into()),
        ..EnvConfig::default()
    };
    let err = ConfigLoader::new().load_with_env(env, false).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroAttempts { .. })
    ));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("nope.toml"))
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[bus\nbackend = ");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
}

#[test]
fn unknown_backend_names_the_setting() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[durable_store]\nbackend = \"gcs\"\n");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidValue { key: "durable_store.backend", .. }
    ));
}

#[test]
fn env_file_values_are_picked_up() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join(".env");
    fs::write(&env_file, "AUDITORIA_TEST_ONLY_MARKER=present\n").unwrap();
    let config_path = write_config(&dir, SAMPLE);

    let load = ConfigLoader::new()
        .with_env_file(&env_file)
        .with_config_path(&config_path)
        .load()
        .unwrap();

    assert!(load.config.metadata.env_file_loaded);
    assert_eq!(
        std::env::var("AUDITORIA_TEST_ONLY_MARKER").as_deref(),
        Ok("present")
    );
}

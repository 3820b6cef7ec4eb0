use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations are humantime strings (`"1s"`, `"250ms"`); enum-like values are
/// kept as strings so they share the environment's parsing and error paths.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub bus: FileBusConfig,
    #[serde(default)]
    pub fast_store: FileFastStoreConfig,
    #[serde(default)]
    pub durable_store: FileDurableStoreConfig,
    #[serde(default)]
    pub persistence: FilePersistenceConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBusConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brokers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_earliest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_timeout: Option<String>,
    #[serde(default)]
    pub retry: FileRetryConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileFastStoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDurableStoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePersistenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_retry_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
}

/// Environment-derived configuration values.
///
/// Blank variables count as unset.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
    pub bus_backend: Option<String>,
    pub kafka_broker: Option<String>,
    pub kafka_topic: Option<String>,
    pub kafka_producer_client_id: Option<String>,
    pub kafka_consumer_client_id: Option<String>,
    pub kafka_group_id: Option<String>,
    pub kafka_from_beginning: Option<bool>,
    pub kafka_message_timeout: Option<String>,
    pub bus_retry_attempts: Option<String>,
    pub bus_retry_delay: Option<String>,
    pub bus_retry_multiplier: Option<String>,
    pub bus_retry_max_delay: Option<String>,
    pub fast_store_backend: Option<String>,
    pub redis_url: Option<String>,
    pub redis_host: Option<String>,
    pub redis_port: Option<String>,
    pub durable_store_backend: Option<String>,
    pub bucket_name: Option<String>,
    pub aws_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub durable_prefix: Option<String>,
    pub durable_root: Option<PathBuf>,
    pub store_write_timeout: Option<String>,
    pub store_write_attempts: Option<String>,
    pub store_write_retry_delay: Option<String>,
    pub log_id_strategy: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment view from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).and_then(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        Self {
            config_path: var("AUDITORIA_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT").or_else(|| var("PORT")),
            bus_backend: var("BUS_BACKEND"),
            kafka_broker: var("KAFKA_BROKER"),
            kafka_topic: var("KAFKA_TOPIC"),
            kafka_producer_client_id: var("KAFKA_PRODUCER_CLIENT_ID"),
            kafka_consumer_client_id: var("KAFKA_CONSUMER_CLIENT_ID"),
            kafka_group_id: var("KAFKA_GROUP_ID"),
            kafka_from_beginning: var("KAFKA_FROM_BEGINNING")
                .as_deref()
                .and_then(parse_bool),
            kafka_message_timeout: var("KAFKA_MESSAGE_TIMEOUT"),
            bus_retry_attempts: var("BUS_RETRY_ATTEMPTS"),
            bus_retry_delay: var("BUS_RETRY_DELAY"),
            bus_retry_multiplier: var("BUS_RETRY_MULTIPLIER"),
            bus_retry_max_delay: var("BUS_RETRY_MAX_DELAY"),
            fast_store_backend: var("FAST_STORE_BACKEND"),
            redis_url: var("REDIS_URL"),
            redis_host: var("REDIS_HOST"),
            redis_port: var("REDIS_PORT"),
            durable_store_backend: var("DURABLE_STORE_BACKEND"),
            bucket_name: var("BUCKET_NAME"),
            aws_region: var("AWS_REGION"),
            s3_endpoint: var("S3_ENDPOINT"),
            aws_access_key_id: var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: var("AWS_SESSION_TOKEN"),
            durable_prefix: var("DURABLE_PREFIX"),
            durable_root: var("DURABLE_ROOT").map(PathBuf::from),
            store_write_timeout: var("STORE_WRITE_TIMEOUT"),
            store_write_attempts: var("STORE_WRITE_ATTEMPTS"),
            store_write_retry_delay: var("STORE_WRITE_RETRY_DELAY"),
            log_id_strategy: var("LOG_ID_STRATEGY"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

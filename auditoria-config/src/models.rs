use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use auditoria_core::{
    LogIdStrategy, RetryPolicy, WritePolicy, store::object::S3Settings,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub fast_store: FastStoreConfig,
    pub durable_store: DurableStoreConfig,
    pub persistence: PersistenceConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusBackend {
    #[default]
    Kafka,
    Memory,
}

impl FromStr for BusBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(BusBackend::Kafka),
            "memory" => Ok(BusBackend::Memory),
            other => Err(format!(
                "unknown bus backend `{other}` (expected kafka or memory)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub backend: BusBackend,
    /// Comma separated `host:port` list.
    pub brokers: String,
    pub topic: String,
    pub producer_client_id: String,
    pub consumer_client_id: String,
    pub group_id: String,
    pub from_earliest: bool,
    pub message_timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for FastBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(FastBackend::Redis),
            "memory" => Ok(FastBackend::Memory),
            other => Err(format!(
                "unknown fast store backend `{other}` (expected redis or memory)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FastStoreConfig {
    pub backend: FastBackend,
    pub redis_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurableBackend {
    #[default]
    S3,
    Fs,
    Memory,
}

impl FromStr for DurableBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(DurableBackend::S3),
            "fs" | "filesystem" => Ok(DurableBackend::Fs),
            "memory" => Ok(DurableBackend::Memory),
            other => Err(format!(
                "unknown durable store backend `{other}` (expected s3, fs or memory)"
            )),
        }
    }
}

#[derive(Clone)]
pub struct DurableStoreConfig {
    pub backend: DurableBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Object key prefix, `eventos` unless overridden.
    pub prefix: String,
    /// Root directory for the `fs` backend.
    pub root: PathBuf,
}

impl fmt::Debug for DurableStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableStoreConfig")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.access_key_id.as_ref().map(|_| "***"))
            .field("prefix", &self.prefix)
            .field("root", &self.root)
            .finish()
    }
}

impl DurableStoreConfig {
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone().unwrap_or_default(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub write_timeout: Duration,
    pub write_attempts: u32,
    pub write_retry_delay: Duration,
    pub log_id: LogIdStrategy,
}

impl PersistenceConfig {
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            timeout: self.write_timeout,
            max_attempts: self.write_attempts,
            retry_delay: self.write_retry_delay,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

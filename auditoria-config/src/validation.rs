use auditoria_core::LogIdStrategy;
use thiserror::Error;
use url::Url;

use super::models::{BusBackend, Config, DurableBackend, FastBackend};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("BUCKET_NAME is required when the durable store backend is s3")]
    MissingBucket,
    #[error("KAFKA_BROKER is required when the bus backend is kafka")]
    MissingBrokers,
    #[error("the audit topic name must not be empty")]
    EmptyTopic,
    #[error("{field} must be at least 1")]
    ZeroAttempts { field: &'static str },
    #[error("invalid Redis URL `{url}`: {reason}")]
    InvalidRedisUrl { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.bus.topic.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyTopic);
    }
    if config.bus.backend == BusBackend::Kafka
        && config.bus.brokers.trim().is_empty()
    {
        return Err(ConfigGuardRailError::MissingBrokers);
    }
    if config.bus.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroAttempts {
            field: "BUS_RETRY_ATTEMPTS",
        });
    }
    if config.persistence.write_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroAttempts {
            field: "STORE_WRITE_ATTEMPTS",
        });
    }

    match config.fast_store.backend {
        FastBackend::Redis => validate_redis_url(&config.fast_store.redis_url)?,
        FastBackend::Memory => warnings.push_with_hint(
            "Fast store is in-memory; cached audit records vanish on restart",
            "Set FAST_STORE_BACKEND=redis and REDIS_URL for a shared cache",
        ),
    }

    match config.durable_store.backend {
        DurableBackend::S3 => {
            let bucket = config.durable_store.bucket.as_deref().unwrap_or("");
            if bucket.trim().is_empty() {
                return Err(ConfigGuardRailError::MissingBucket);
            }
            if config.durable_store.access_key_id.is_none() {
                warnings.push_with_hint(
                    "AWS_ACCESS_KEY_ID not set; S3 requests rely on the ambient credential chain",
                    "Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY when running outside AWS",
                );
            }
        }
        DurableBackend::Fs => warnings.push(format!(
            "Durable store writes to the local directory {}",
            config.durable_store.root.display()
        )),
        DurableBackend::Memory => warnings.push_with_hint(
            "Durable store is in-memory; nothing survives a restart",
            "Use DURABLE_STORE_BACKEND=s3 outside development",
        ),
    }

    if config.bus.backend == BusBackend::Memory {
        warnings.push(
            "Bus backend is in-memory; only the standalone mode can exchange events",
        );
    }

    if config.persistence.log_id == LogIdStrategy::Timestamp {
        warnings.push_with_hint(
            "LOG_ID_STRATEGY=timestamp: events consumed in the same millisecond overwrite each other",
            "Use uuid, or offset for redelivery-safe keys",
        );
    }

    Ok(warnings)
}

fn validate_redis_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let url = Url::parse(raw).map_err(|err| {
        ConfigGuardRailError::InvalidRedisUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        }
    })?;
    match url.scheme() {
        "redis" | "rediss" | "redis+unix" | "unix" => Ok(()),
        other => Err(ConfigGuardRailError::InvalidRedisUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

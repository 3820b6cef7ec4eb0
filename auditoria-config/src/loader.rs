use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use auditoria_core::{
    LogIdStrategy, RetryPolicy, persistence::DEFAULT_OBJECT_PREFIX,
};
use auditoria_model::DEFAULT_TOPIC;
use thiserror::Error;
use tracing::debug;

use super::{
    models::{
        BusBackend, BusConfig, Config, ConfigMetadata, DurableBackend,
        DurableStoreConfig, FastBackend, FastStoreConfig, PersistenceConfig,
        ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["auditoria.toml", "config/auditoria.toml"];

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BROKERS: &str = "localhost:9092";
pub const DEFAULT_PRODUCER_CLIENT_ID: &str = "gateway-producer";
pub const DEFAULT_CONSUMER_CLIENT_ID: &str = "auditoria-consumer";
pub const DEFAULT_GROUP_ID: &str = "grupo-auditoria-logs";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, then the TOML file, then the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Same as [`ConfigLoader::load`] with an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let config_present = file_config.is_some();

        let mut warnings = ConfigWarnings::default();
        if !config_present {
            warnings.push_with_hint(
                "No auditoria.toml detected; falling back to environment variables",
                "Pass --config or set AUDITORIA_CONFIG to use a configuration file",
            );
        }

        let config = compose_config(
            file_config.unwrap_or_default(),
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;

        warnings.extend(validation::apply_guard_rails(&config)?);
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = if let Some(path) = &self.options.config_path {
            (path.clone(), true)
        } else if let Some(path) = &env.config_path {
            (path.clone(), true)
        } else if let Some(found) = DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
        {
            (found, false)
        } else {
            return Ok((None, None));
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        bus: file_bus,
        fast_store: file_fast,
        durable_store: file_durable,
        persistence: file_persistence,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: parse_value("SERVER_PORT", env.server_port)?
            .or(file_server.port)
            .unwrap_or(DEFAULT_PORT),
    };

    let defaults = RetryPolicy::default();
    let retry = RetryPolicy {
        max_attempts: parse_value("BUS_RETRY_ATTEMPTS", env.bus_retry_attempts)?
            .or(file_bus.retry.max_attempts)
            .unwrap_or(defaults.max_attempts),
        base_delay: layered_duration(
            ("BUS_RETRY_DELAY", env.bus_retry_delay),
            ("bus.retry.base_delay", file_bus.retry.base_delay),
        )?
        .unwrap_or(defaults.base_delay),
        multiplier: parse_value("BUS_RETRY_MULTIPLIER", env.bus_retry_multiplier)?
            .or(file_bus.retry.multiplier)
            .unwrap_or(defaults.multiplier),
        max_delay: layered_duration(
            ("BUS_RETRY_MAX_DELAY", env.bus_retry_max_delay),
            ("bus.retry.max_delay", file_bus.retry.max_delay),
        )?
        .unwrap_or(defaults.max_delay),
    };

    let bus = BusConfig {
        backend: layered::<BusBackend>(
            ("BUS_BACKEND", env.bus_backend),
            ("bus.backend", file_bus.backend),
        )?
        .unwrap_or_default(),
        brokers: env
            .kafka_broker
            .or(file_bus.brokers)
            .unwrap_or_else(|| DEFAULT_BROKERS.to_string()),
        topic: env
            .kafka_topic
            .or(file_bus.topic)
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        producer_client_id: env
            .kafka_producer_client_id
            .or(file_bus.producer_client_id)
            .unwrap_or_else(|| DEFAULT_PRODUCER_CLIENT_ID.to_string()),
        consumer_client_id: env
            .kafka_consumer_client_id
            .or(file_bus.consumer_client_id)
            .unwrap_or_else(|| DEFAULT_CONSUMER_CLIENT_ID.to_string()),
        group_id: env
            .kafka_group_id
            .or(file_bus.group_id)
            .unwrap_or_else(|| DEFAULT_GROUP_ID.to_string()),
        from_earliest: env
            .kafka_from_beginning
            .or(file_bus.from_earliest)
            .unwrap_or(true),
        message_timeout: layered_duration(
            ("KAFKA_MESSAGE_TIMEOUT", env.kafka_message_timeout),
            ("bus.message_timeout", file_bus.message_timeout),
        )?
        .unwrap_or(DEFAULT_MESSAGE_TIMEOUT),
        retry,
    };

    let redis_url = match (env.redis_url, env.redis_host) {
        (Some(url), _) => url,
        (None, Some(host)) => {
            let port = parse_value("REDIS_PORT", env.redis_port)?
                .unwrap_or(DEFAULT_REDIS_PORT);
            format!("redis://{host}:{port}")
        }
        (None, None) => file_fast
            .redis_url
            .unwrap_or_else(|| format!("redis://127.0.0.1:{DEFAULT_REDIS_PORT}")),
    };
    let fast_store = FastStoreConfig {
        backend: layered::<FastBackend>(
            ("FAST_STORE_BACKEND", env.fast_store_backend),
            ("fast_store.backend", file_fast.backend),
        )?
        .unwrap_or_default(),
        redis_url,
    };

    let durable_store = DurableStoreConfig {
        backend: layered::<DurableBackend>(
            ("DURABLE_STORE_BACKEND", env.durable_store_backend),
            ("durable_store.backend", file_durable.backend),
        )?
        .unwrap_or_default(),
        bucket: env.bucket_name.or(file_durable.bucket),
        region: env.aws_region.or(file_durable.region),
        endpoint: env.s3_endpoint.or(file_durable.endpoint),
        access_key_id: env.aws_access_key_id,
        secret_access_key: env.aws_secret_access_key,
        session_token: env.aws_session_token,
        prefix: env
            .durable_prefix
            .or(file_durable.prefix)
            .unwrap_or_else(|| DEFAULT_OBJECT_PREFIX.to_string()),
        root: env
            .durable_root
            .or(file_durable.root)
            .unwrap_or_else(|| PathBuf::from("./data/auditoria")),
    };

    let persistence = PersistenceConfig {
        write_timeout: layered_duration(
            ("STORE_WRITE_TIMEOUT", env.store_write_timeout),
            ("persistence.write_timeout", file_persistence.write_timeout),
        )?
        .unwrap_or(DEFAULT_WRITE_TIMEOUT),
        write_attempts: parse_value(
            "STORE_WRITE_ATTEMPTS",
            env.store_write_attempts,
        )?
        .or(file_persistence.write_attempts)
        .unwrap_or(1),
        write_retry_delay: layered_duration(
            ("STORE_WRITE_RETRY_DELAY", env.store_write_retry_delay),
            (
                "persistence.write_retry_delay",
                file_persistence.write_retry_delay,
            ),
        )?
        .unwrap_or(DEFAULT_WRITE_RETRY_DELAY),
        log_id: layered::<LogIdStrategy>(
            ("LOG_ID_STRATEGY", env.log_id_strategy),
            ("persistence.log_id", file_persistence.log_id),
        )?
        .unwrap_or_default(),
    };

    Ok(Config {
        server,
        bus,
        fast_store,
        durable_store,
        persistence,
        metadata,
    })
}

fn parse_value<T>(
    key: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|err| {
            ConfigLoadError::InvalidValue {
                key,
                value: value.clone(),
                reason: err.to_string(),
            }
        })
    })
    .transpose()
}

/// Environment value if set, otherwise the file value. The file value is
/// only parsed when the environment does not override it.
fn layered<T>(
    env: (&'static str, Option<String>),
    file: (&'static str, Option<String>),
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    match parse_value(env.0, env.1)? {
        Some(value) => Ok(Some(value)),
        None => parse_value(file.0, file.1),
    }
}

fn layered_duration(
    env: (&'static str, Option<String>),
    file: (&'static str, Option<String>),
) -> Result<Option<Duration>, ConfigLoadError> {
    match parse_duration(env.0, env.1)? {
        Some(value) => Ok(Some(value)),
        None => parse_duration(file.0, file.1),
    }
}

fn parse_duration(
    key: &'static str,
    raw: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    raw.map(|value| {
        humantime::parse_duration(value.trim()).map_err(|err| {
            ConfigLoadError::InvalidValue {
                key,
                value: value.clone(),
                reason: err.to_string(),
            }
        })
    })
    .transpose()
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(file: FileConfig, env: EnvConfig) -> Config {
        compose_config(file, env, ConfigMetadata::default()).unwrap()
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = compose(FileConfig::default(), EnvConfig::default());

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.bus.topic, "logs-auditoria");
        assert_eq!(config.bus.group_id, "grupo-auditoria-logs");
        assert!(config.bus.from_earliest);
        assert_eq!(config.bus.retry, RetryPolicy::default());
        assert_eq!(config.persistence.write_attempts, 1);
        assert_eq!(config.persistence.write_timeout, Duration::from_secs(10));
        assert_eq!(
            config.persistence.write_policy().retry_delay,
            Duration::from_millis(200)
        );
        assert_eq!(config.persistence.log_id, LogIdStrategy::Uuid);
        assert_eq!(config.durable_store.prefix, "eventos");
        assert_eq!(config.fast_store.redis_url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn redis_host_builds_url() {
        let env = EnvConfig {
            redis_host: Some("cache".into()),
            ..EnvConfig::default()
        };
        let config = compose(FileConfig::default(), env);
        assert_eq!(config.fast_store.redis_url, "redis://cache:6379");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = FileConfig::default();
        file.bus.topic = Some("from-file".into());
        file.bus.retry.base_delay = Some("250ms".into());
        file.persistence.log_id = Some("timestamp".into());
        let env = EnvConfig {
            kafka_topic: Some("from-env".into()),
            log_id_strategy: Some("offset".into()),
            ..EnvConfig::default()
        };

        let config = compose(file, env);

        assert_eq!(config.bus.topic, "from-env");
        assert_eq!(config.bus.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.persistence.log_id, LogIdStrategy::Offset);
    }

    #[test]
    fn environment_shadows_invalid_file_values() {
        let mut file = FileConfig::default();
        file.bus.retry.base_delay = Some("whenever".into());
        file.bus.backend = Some("carrier-pigeon".into());
        file.persistence.write_retry_delay = Some("soonish".into());
        let env = EnvConfig {
            bus_retry_delay: Some("2s".into()),
            bus_backend: Some("memory".into()),
            store_write_retry_delay: Some("50ms".into()),
            ..EnvConfig::default()
        };

        let config = compose(file, env);

        assert_eq!(config.bus.retry.base_delay, Duration::from_secs(2));
        assert_eq!(config.bus.backend, BusBackend::Memory);
        assert_eq!(
            config.persistence.write_retry_delay,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn invalid_file_value_without_override_is_rejected() {
        let mut file = FileConfig::default();
        file.bus.retry.base_delay = Some("whenever".into());
        let err =
            compose_config(file, EnvConfig::default(), ConfigMetadata::default())
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidValue { key: "bus.retry.base_delay", .. }
        ));
    }

    #[test]
    fn invalid_values_name_their_key() {
        let env = EnvConfig {
            bus_retry_delay: Some("soon".into()),
            ..EnvConfig::default()
        };
        let err = compose_config(FileConfig::default(), env, ConfigMetadata::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidValue { key: "BUS_RETRY_DELAY", .. }
        ));
    }
}

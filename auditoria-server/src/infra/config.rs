pub use auditoria_config::{
    BusBackend, BusConfig, Config, ConfigLoad, ConfigLoadError, ConfigLoader,
    ConfigLoaderOptions, ConfigWarnings, DurableBackend, DurableStoreConfig,
    FastBackend, FastStoreConfig, PersistenceConfig, ServerConfig,
};

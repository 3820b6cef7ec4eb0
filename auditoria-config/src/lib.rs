//! Configuration for the audit gateway and worker.
//!
//! Values come from a `.env` file, an optional `auditoria.toml` and the
//! process environment, with the environment taking precedence over the file
//! and the file over built-in defaults. Loading never touches the network;
//! it only validates that the resulting combination can work.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    BusBackend, BusConfig, Config, ConfigMetadata, DurableBackend,
    DurableStoreConfig, FastBackend, FastStoreConfig, PersistenceConfig,
    ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};

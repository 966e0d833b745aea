//! Configuration module

pub mod settings;

pub use settings::{
    GenerationSettings, LoggingConfig, ProviderSeed, RateLimitConfig, ServerConfig, Settings,
    StorageBackend, StorageConfig,
};

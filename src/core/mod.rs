//! Shared infrastructure for the engine.
//!
//! Configuration loading and the retry primitive used around step invocation.

mod config;
mod retry;

pub use config::{
    Config, ConfigError, EngineConfig, LoggingConfig, StoreConfig, LOCAL_CONFIG_FILE,
};
pub use retry::{retry_async, RetryConfig, RetryResult};

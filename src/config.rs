use crate::cache::{CacheConfig, StorageCapabilities};
use crate::rate_limiter::RateLimitConfig;
use config::{Config, ConfigError, Environment, File};
use lazy_static::lazy_static;
use log::warn;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

// Initialize global configuration
lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::load());
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window_ms: u64,
    pub retry_after_ms: u64,
    pub max_retries: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_ms: 60_000,
            retry_after_ms: 1_000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    pub default_ttl_secs: u64,
    pub max_size: usize,
    /// SQLite file used when set; takes precedence over `key_value_path`.
    pub database_path: Option<String>,
    /// JSON document used as a persistent key-value store.
    pub key_value_path: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 60,
            max_size: 1_000,
            database_path: None,
            key_value_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Aggregator {
    pub consensus_threshold: f64,
    pub provider_timeout_ms: u64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.5,
            provider_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Valuator {
    pub cache_timeout_secs: u64,
}

impl Default for Valuator {
    fn default() -> Self {
        Self {
            cache_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Providers {
    pub binance_url: String,
    pub kraken_url: String,
    pub huobi_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            binance_url: "https://api.binance.com".to_string(),
            kraken_url: "https://api.kraken.com".to_string(),
            huobi_url: "https://api.huobi.pro".to_string(),
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: Server,
    pub rate_limit: RateLimit,
    pub cache: CacheSettings,
    pub aggregator: Aggregator,
    pub valuator: Valuator,
    pub providers: Providers,
}

impl Settings {
    /// Reads `config.{toml,yaml,json}` (optional) and `PRICE_INDEX__*`
    /// environment variables on top of the built-in defaults.
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("PRICE_INDEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    fn load() -> Self {
        match Self::new() {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Could not load configuration: {}, using default values", err);
                Self::default()
            }
        }
    }

    // Helper method to reload configuration
    pub fn reload() -> Result<(), ConfigError> {
        let settings = Settings::new()?;
        let mut write_guard = SETTINGS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *write_guard = settings;
        Ok(())
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit.max_requests,
            window: Duration::from_millis(self.rate_limit.window_ms),
            retry_after: Duration::from_millis(self.rate_limit.retry_after_ms),
            max_retries: self.rate_limit.max_retries,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
            max_size: self.cache.max_size,
        }
    }

    pub fn storage_capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            database: self.cache.database_path.as_ref().map(PathBuf::from),
            key_value: self.cache.key_value_path.as_ref().map(PathBuf::from),
        }
    }
}

fn read_settings() -> RwLockReadGuard<'static, Settings> {
    SETTINGS.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Convenience methods to get configuration values
pub fn get_server_addr() -> String {
    let settings = read_settings();
    format!("{}:{}", settings.server.host, settings.server.port)
}

pub fn get_rate_limit_config() -> RateLimitConfig {
    read_settings().rate_limit_config()
}

pub fn get_cache_config() -> CacheConfig {
    read_settings().cache_config()
}

pub fn get_storage_capabilities() -> StorageCapabilities {
    read_settings().storage_capabilities()
}

pub fn get_consensus_threshold() -> f64 {
    read_settings().aggregator.consensus_threshold
}

pub fn get_provider_timeout() -> Duration {
    Duration::from_millis(read_settings().aggregator.provider_timeout_ms)
}

pub fn get_valuator_cache_timeout() -> Duration {
    Duration::from_secs(read_settings().valuator.cache_timeout_secs)
}

pub fn get_binance_url() -> String {
    read_settings().providers.binance_url.clone()
}

pub fn get_kraken_url() -> String {
    read_settings().providers.kraken_url.clone()
}

pub fn get_huobi_url() -> String {
    read_settings().providers.huobi_url.clone()
}

pub fn get_request_timeout() -> Duration {
    Duration::from_secs(read_settings().providers.request_timeout_secs)
}

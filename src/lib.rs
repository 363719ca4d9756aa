//! Consensus Price Index
//!
//! This library aggregates current asset prices from several unreliable
//! price sources into one trusted price per symbol, shields callers from
//! outages and rate limits with caching and backoff, and converts between
//! assets through their USD prices.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod rate_limiter;
pub mod valuator;

// Re-export commonly used items
pub use aggregator::{consensus_price, PriceAggregator};
pub use api::start_server;
pub use cache::{Cache, CacheBackend, CacheConfig, StorageCapabilities};
pub use config::SETTINGS;
pub use error::{PriceError, Result};
pub use models::{ConversionRequest, Quote};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use valuator::Valuator;

// Re-export provider types
pub use providers::binance::BinanceProvider;
pub use providers::huobi::HuobiProvider;
pub use providers::kraken::KrakenProvider;
pub use providers::PriceProvider;

#![allow(dead_code)]

use async_trait::async_trait;
use consensus_price_index::{
    Cache, CacheConfig, PriceAggregator, PriceError, PriceProvider, Quote, RateLimitConfig,
    RateLimiter, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Behavior {
    Prices(HashMap<String, f64>),
    Down,
    Throttled,
}

/// In-process provider with canned answers that counts how often it is asked.
pub struct StubProvider {
    name: &'static str,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn with_prices(name: &'static str, prices: &[(&str, f64)]) -> Self {
        Self {
            name,
            behavior: Behavior::Prices(
                prices
                    .iter()
                    .map(|(symbol, price)| (symbol.to_string(), *price))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn down(name: &'static str) -> Self {
        Self {
            name,
            behavior: Behavior::Down,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn throttled(name: &'static str) -> Self {
        Self {
            name,
            behavior: Behavior::Throttled,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> PriceError {
        match self.behavior {
            Behavior::Throttled => PriceError::Throttled(self.name.to_string()),
            _ => PriceError::ProviderUnavailable {
                provider: self.name.to_string(),
                message: "connection refused".to_string(),
            },
        }
    }
}

#[async_trait]
impl PriceProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Prices(prices) => prices
                .get(&symbol.to_ascii_uppercase())
                .map(|price| Quote::new(symbol, currency, *price).with_source(self.name))
                .ok_or_else(|| PriceError::PriceNotFound {
                    symbol: symbol.to_string(),
                    currency: currency.to_string(),
                }),
            _ => Err(self.failure()),
        }
    }

    async fn fetch_prices(&self, symbols: &[String], currency: &str) -> Result<Vec<Quote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Prices(prices) => Ok(symbols
                .iter()
                .filter_map(|symbol| {
                    prices
                        .get(&symbol.to_ascii_uppercase())
                        .map(|price| Quote::new(symbol, currency, *price).with_source(self.name))
                })
                .collect()),
            _ => Err(self.failure()),
        }
    }
}

/// A limiter loose enough never to delay a test.
pub fn relaxed_limiter() -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        max_requests: 1_000,
        window: Duration::from_secs(60),
        retry_after: Duration::from_millis(10),
        max_retries: 2,
    })
}

pub fn aggregator(providers: Vec<Arc<dyn PriceProvider>>) -> PriceAggregator {
    PriceAggregator::new(
        providers,
        Cache::in_memory(CacheConfig::default()),
        relaxed_limiter(),
    )
}

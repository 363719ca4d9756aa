// Multi-provider consensus pricing
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::cache::Cache;
use crate::config;
use crate::error::{PriceError, Result};
use crate::models::{canonical, Quote};
use crate::providers::PriceProvider;
use crate::rate_limiter::RateLimiter;

/// Largest relative distance from the median a price may have to count
/// towards the mean.
pub const MAX_DEVIATION: f64 = 0.10;

pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.5;

/// Reduces prices observed for one symbol to a single trusted price.
///
/// A single price is returned unchanged. Otherwise prices deviating more
/// than [`MAX_DEVIATION`] from the median (lower-middle element for even
/// counts) are discarded. If fewer than `prices.len() * threshold` prices
/// survive, the median itself is returned; else the mean of the survivors.
pub fn consensus_price(prices: &[f64], threshold: f64) -> Option<f64> {
    match prices {
        [] => return None,
        [only] => return Some(*only),
        _ => {}
    }

    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[(sorted.len() - 1) / 2];

    let survivors: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|price| deviation(*price, median) <= MAX_DEVIATION)
        .collect();

    if (survivors.len() as f64) < sorted.len() as f64 * threshold {
        debug!(
            "Only {}/{} prices within {}% of median {}, using median",
            survivors.len(),
            sorted.len(),
            MAX_DEVIATION * 100.0,
            median
        );
        return Some(median);
    }

    Some(survivors.iter().sum::<f64>() / survivors.len() as f64)
}

fn deviation(price: f64, median: f64) -> f64 {
    if median == 0.0 {
        if price == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((price - median) / median).abs()
    }
}

fn is_usable(quote: &Quote) -> bool {
    quote.price.is_finite() && quote.price > 0.0
}

/// Cache and rate-limiter key of a symbol/currency pair.
pub fn cache_key(symbol: &str, currency: &str) -> String {
    format!("{}-{}", canonical(symbol), canonical(currency))
}

pub struct PriceAggregator {
    providers: RwLock<Vec<Arc<dyn PriceProvider>>>,
    cache: Cache,
    rate_limiter: RateLimiter,
    consensus_threshold: f64,
    provider_timeout: Option<Duration>,
}

impl PriceAggregator {
    /// Providers are queried in the order given.
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, cache: Cache, rate_limiter: RateLimiter) -> Self {
        Self {
            providers: RwLock::new(providers),
            cache,
            rate_limiter,
            consensus_threshold: DEFAULT_CONSENSUS_THRESHOLD,
            provider_timeout: None,
        }
    }

    /// Builds an aggregator whose cache, limiter, threshold and timeout come
    /// from the global settings.
    pub fn from_settings(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        let cache = Cache::from_capabilities(
            &config::get_storage_capabilities(),
            config::get_cache_config(),
        );
        let rate_limiter = RateLimiter::new(config::get_rate_limit_config());
        Self::new(providers, cache, rate_limiter)
            .with_consensus_threshold(config::get_consensus_threshold())
            .with_provider_timeout(config::get_provider_timeout())
    }

    pub fn with_consensus_threshold(mut self, threshold: f64) -> Self {
        self.consensus_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Bounds every provider call; a call that runs longer counts as a
    /// provider failure.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = Some(timeout);
        self
    }

    pub fn consensus_threshold(&self) -> f64 {
        self.consensus_threshold
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Returns the consensus price of `symbol` in `currency`.
    ///
    /// Providers are asked one after another until enough quotes for a
    /// consensus are collected. Failing providers are skipped; only when
    /// none of them produced a quote does the call fail with
    /// [`PriceError::NoPriceData`].
    pub async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        let symbol = canonical(symbol);
        let currency = canonical(currency);
        let key = cache_key(&symbol, &currency);

        if let Some(quote) = self.cache.get::<Quote>(&key).await {
            debug!("Cache hit for {}", key);
            return Ok(quote);
        }

        let providers = self.providers.read().await.clone();
        let quote = self
            .rate_limiter
            .execute(&key, || self.query_in_order(&providers, &symbol, &currency))
            .await?;

        self.cache.set(&key, &quote, None).await;
        Ok(quote)
    }

    async fn query_in_order(
        &self,
        providers: &[Arc<dyn PriceProvider>],
        symbol: &str,
        currency: &str,
    ) -> Result<Quote> {
        let enough = ((providers.len() as f64) * self.consensus_threshold).ceil() as usize;
        let mut quotes = Vec::new();

        for provider in providers {
            match self
                .guarded(provider.name(), provider.fetch_price(symbol, currency))
                .await
            {
                Ok(quote) if !is_usable(&quote) => {
                    warn!(
                        "Ignoring unusable {} price {} from {}",
                        symbol,
                        quote.price,
                        provider.name()
                    );
                }
                Ok(quote) => {
                    debug!("{} {}/{}: {}", provider.name(), symbol, currency, quote.price);
                    quotes.push(quote);
                    if quotes.len() >= enough.max(1) {
                        break;
                    }
                }
                Err(e) if e.is_throttling() => return Err(e),
                Err(e) => warn!("Error fetching {} price from {}: {}", symbol, provider.name(), e),
            }
        }

        self.reduce(symbol, currency, &quotes)
            .ok_or_else(|| PriceError::NoPriceData(symbol.to_string()))
    }

    /// Returns consensus prices for every symbol some provider could price.
    ///
    /// Cached symbols are served from the cache; the rest are requested
    /// from every provider in one rate-limited round. Symbols no provider
    /// resolved are left out of the result.
    pub async fn fetch_multiple_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<Quote>> {
        let currency = canonical(currency);
        let mut results = Vec::with_capacity(symbols.len());
        let mut uncached: Vec<String> = Vec::new();

        for symbol in symbols.iter().map(|s| canonical(s)) {
            match self.cache.get::<Quote>(&cache_key(&symbol, &currency)).await {
                Some(quote) => results.push(quote),
                None if !uncached.contains(&symbol) => uncached.push(symbol),
                None => {}
            }
        }

        if uncached.is_empty() {
            return Ok(results);
        }

        let providers = self.providers.read().await.clone();
        let key = format!("{}-{}", uncached.join(","), currency);
        let resolved = self
            .rate_limiter
            .execute(&key, || self.query_all(&providers, &uncached, &currency))
            .await?;

        if resolved.len() < uncached.len() {
            info!(
                "Resolved {}/{} symbols in {}",
                resolved.len(),
                uncached.len(),
                currency
            );
        }

        for quote in resolved {
            self.cache
                .set(&cache_key(&quote.symbol, &quote.currency), &quote, None)
                .await;
            results.push(quote);
        }
        Ok(results)
    }

    async fn query_all(
        &self,
        providers: &[Arc<dyn PriceProvider>],
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<Quote>> {
        let outcomes = join_all(
            providers
                .iter()
                .map(|provider| self.guarded(provider.name(), provider.fetch_prices(symbols, currency))),
        )
        .await;

        let mut grouped: HashMap<String, Vec<Quote>> = HashMap::new();
        for (provider, outcome) in providers.iter().zip(outcomes) {
            match outcome {
                Ok(quotes) => {
                    for quote in quotes {
                        grouped.entry(canonical(&quote.symbol)).or_default().push(quote);
                    }
                }
                Err(e) if e.is_throttling() => return Err(e),
                Err(e) => warn!("Error fetching batch prices from {}: {}", provider.name(), e),
            }
        }

        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let quotes = grouped.get(symbol)?;
                self.reduce(symbol, currency, quotes)
            })
            .collect())
    }

    /// Consensus of the usable quotes, stamped now and labelled with the
    /// providers that contributed.
    fn reduce(&self, symbol: &str, currency: &str, quotes: &[Quote]) -> Option<Quote> {
        let valid: Vec<&Quote> = quotes.iter().filter(|quote| is_usable(quote)).collect();
        let prices: Vec<f64> = valid.iter().map(|quote| quote.price).collect();
        let price = consensus_price(&prices, self.consensus_threshold)?;

        let sources: Vec<&str> = valid
            .iter()
            .filter_map(|quote| quote.source.as_deref())
            .collect();
        let mut quote = Quote::new(symbol, currency, price);
        if !sources.is_empty() {
            quote = quote.with_source(&sources.join(","));
        }
        Some(quote)
    }

    async fn guarded<T>(&self, provider: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(PriceError::ProviderUnavailable {
                    provider: provider.to_string(),
                    message: format!("no response within {:?}", limit),
                })
            }),
            None => call.await,
        }
    }

    /// Appends a provider at the lowest priority.
    pub async fn add_provider(&self, provider: Arc<dyn PriceProvider>) {
        info!("Adding price provider {}", provider.name());
        self.providers.write().await.push(provider);
    }

    /// Removes the provider at `index`, if there is one.
    pub async fn remove_provider(&self, index: usize) -> Option<Arc<dyn PriceProvider>> {
        let mut providers = self.providers.write().await;
        if index < providers.len() {
            let removed = providers.remove(index);
            info!("Removed price provider {}", removed.name());
            Some(removed)
        } else {
            None
        }
    }

    pub async fn provider_names(&self) -> Vec<&'static str> {
        self.providers
            .read()
            .await
            .iter()
            .map(|provider| provider.name())
            .collect()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn reset_rate_limiter(&self) {
        self.rate_limiter.reset();
    }
}

#[async_trait]
impl PriceProvider for PriceAggregator {
    fn name(&self) -> &'static str {
        "Consensus"
    }

    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        PriceAggregator::fetch_price(self, symbol, currency).await
    }

    async fn fetch_prices(&self, symbols: &[String], currency: &str) -> Result<Vec<Quote>> {
        self.fetch_multiple_prices(symbols, currency).await
    }
}

// Price lookup and conversion facade
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use crate::config;
use crate::error::Result;
use crate::models::{canonical, ConversionRequest, Quote, USD};
use crate::providers::PriceProvider;

#[derive(Debug, Clone)]
struct CachedPrice {
    quote: Quote,
    fetched_at: Instant,
}

/// Keeps a short-lived cache of resolved prices keyed by `(BASE, QUOTE)`,
/// separate from whatever caching its provider does.
pub struct Valuator {
    provider: Arc<dyn PriceProvider>,
    prices: Mutex<HashMap<(String, String), CachedPrice>>,
    cache_timeout: Mutex<Duration>,
}

impl Valuator {
    pub fn new(provider: Arc<dyn PriceProvider>, cache_timeout: Duration) -> Self {
        Self {
            provider,
            prices: Mutex::new(HashMap::new()),
            cache_timeout: Mutex::new(cache_timeout),
        }
    }

    pub fn from_settings(provider: Arc<dyn PriceProvider>) -> Self {
        Self::new(provider, config::get_valuator_cache_timeout())
    }

    fn lock_prices(&self) -> MutexGuard<'_, HashMap<(String, String), CachedPrice>> {
        self.prices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cache_timeout(&self) -> Duration {
        *self
            .cache_timeout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Changes the lifetime of cached prices, including those already cached.
    pub fn set_cache_timeout(&self, timeout: Duration) {
        *self
            .cache_timeout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = timeout;
    }

    pub fn clear_cache(&self) {
        self.lock_prices().clear();
    }

    fn cached(&self, base: &str, quote: &str) -> Option<Quote> {
        let timeout = self.cache_timeout();
        let mut prices = self.lock_prices();
        let key = (base.to_string(), quote.to_string());
        match prices.get(&key) {
            Some(cached) if cached.fetched_at.elapsed() < timeout => Some(cached.quote.clone()),
            Some(_) => {
                prices.remove(&key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, quote: &Quote) {
        self.lock_prices().insert(
            (quote.symbol.clone(), quote.currency.clone()),
            CachedPrice {
                quote: quote.clone(),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Price of one unit of `base` in `quote`.
    pub async fn get_price(&self, base: &str, quote: &str) -> Result<Quote> {
        let base = canonical(base);
        let quote = canonical(quote);

        if let Some(cached) = self.cached(&base, &quote) {
            debug!("Valuator cache hit for {}/{}", base, quote);
            return Ok(cached);
        }

        let fresh = self.provider.fetch_price(&base, &quote).await?;
        let mut labelled = Quote::new(&base, &quote, fresh.price).with_observed_at(fresh.observed_at);
        labelled.source = fresh.source;
        self.remember(&labelled);
        Ok(labelled)
    }

    pub async fn get_usd_price(&self, base: &str) -> Result<Quote> {
        self.get_price(base, USD).await
    }

    /// Prices for several symbols, in the order the provider returned them.
    /// Symbols the provider could not price are absent.
    pub async fn get_prices(&self, symbols: &[String], quote: &str) -> Result<Vec<Quote>> {
        let quote = canonical(quote);
        let quotes = self.provider.fetch_prices(symbols, &quote).await?;
        for q in &quotes {
            self.remember(&Quote { currency: quote.clone(), ..q.clone() });
        }
        Ok(quotes)
    }

    /// Converts `amount` of `from` into `to`.
    ///
    /// Pairs without USD on either side are priced through USD:
    /// `from_usd / to_usd * amount`.
    pub async fn convert(&self, request: &ConversionRequest) -> Result<f64> {
        let from = canonical(&request.from);
        let to = canonical(&request.to);
        let amount = request.amount;

        if from == to {
            return Ok(amount);
        }
        if to == USD {
            let price = self.get_usd_price(&from).await?.price;
            return Ok(price * amount);
        }
        if from == USD {
            let price = self.get_usd_price(&to).await?.price;
            return Ok(amount / price);
        }

        let from_usd = self.get_usd_price(&from).await?.price;
        let to_usd = self.get_usd_price(&to).await?.price;
        Ok(from_usd / to_usd * amount)
    }
}

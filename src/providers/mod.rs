// PriceProvider trait, shared response handling
use crate::error::{PriceError, Result};
use crate::models::Quote;
use async_trait::async_trait;
use log::debug;
use reqwest::{Response, StatusCode};

pub mod binance;
pub mod huobi;
pub mod kraken;

/// The PriceProvider trait defines the interface for price sources.
///
/// Every source, whether a single exchange adapter or an aggregate of
/// several, is queried through this trait so that callers never depend on
/// vendor-specific API details.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Returns the name of the provider as a static string
    fn name(&self) -> &'static str;

    /// Fetches the current price of `symbol` quoted in `currency`.
    ///
    /// Fails when the source has no price for the pair or cannot be reached.
    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote>;

    /// Fetches prices for several symbols at once.
    ///
    /// Returns only the symbols the source could resolve; a missing symbol is
    /// never an error. Fails only when the source cannot be reached at all.
    ///
    /// The default implementation queries symbols one at a time. Upstream
    /// throttling is propagated so that callers can back off.
    async fn fetch_prices(&self, symbols: &[String], currency: &str) -> Result<Vec<Quote>> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.fetch_price(symbol, currency).await {
                Ok(quote) => quotes.push(quote),
                Err(e) if e.is_throttling() => return Err(e),
                Err(e) => debug!("{} has no price for {}: {}", self.name(), symbol, e),
            }
        }
        Ok(quotes)
    }
}

/// Maps throttling and error statuses to [`PriceError`]s, passing successful
/// responses through.
pub(crate) fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return Err(PriceError::Throttled(provider.to_string()));
    }
    if !status.is_success() {
        return Err(PriceError::ProviderUnavailable {
            provider: provider.to_string(),
            message: format!("HTTP {}", status),
        });
    }
    Ok(response)
}

/// Parses a vendor price and rejects non-positive values.
pub(crate) fn parse_price(provider: &str, raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(price) => validate_price(provider, price),
        Err(_) => Err(PriceError::InvalidPriceData(format!(
            "{} returned unparsable price '{}'",
            provider, raw
        ))),
    }
}

pub(crate) fn validate_price(provider: &str, price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(PriceError::InvalidPriceData(format!(
            "{} returned non-positive price {}",
            provider, price
        )))
    }
}

/// Exchanges that quote crypto against Tether instead of dollars.
pub(crate) fn stablecoin_quote(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => "USDT".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn http_client(provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(crate::config::get_request_timeout())
        .build()
        .map_err(|e| PriceError::ProviderUnavailable {
            provider: provider.to_string(),
            message: format!("Failed to create HTTP client: {}", e),
        })
}

// REST ticker client
use crate::error::{PriceError, Result};
use crate::models::{canonical, Quote};
use crate::providers::{check_status, http_client, parse_price, PriceProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const TICKER_PATH: &str = "/0/public/Ticker";

// Kraken's legacy asset codes
const ASSET_CODES: &[(&str, &str)] = &[("BTC", "XBT"), ("DOGE", "XDG")];

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    // Last trade closed: [price, lot volume]
    c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

pub struct KrakenProvider {
    client: reqwest::Client,
    base_url: String,
}

impl KrakenProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(&crate::config::get_kraken_url())
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client("Kraken")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn asset_code(symbol: &str) -> String {
        let symbol = canonical(symbol);
        ASSET_CODES
            .iter()
            .find(|(common, _)| *common == symbol)
            .map(|(_, code)| code.to_string())
            .unwrap_or(symbol)
    }

    fn pair(symbol: &str, currency: &str) -> String {
        format!("{}{}", Self::asset_code(symbol), Self::asset_code(currency))
    }
}

#[async_trait]
impl PriceProvider for KrakenProvider {
    fn name(&self) -> &'static str {
        "Kraken"
    }

    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        let pair = Self::pair(symbol, currency);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, TICKER_PATH))
            .query(&[("pair", pair.as_str())])
            .send()
            .await?;
        let response: KrakenResponse = check_status(self.name(), response)?.json().await?;

        if let Some(error) = response.error.first() {
            if error.contains("Rate limit") || error.contains("Too many requests") {
                return Err(PriceError::Throttled(self.name().to_string()));
            }
            if error.contains("Unknown asset pair") {
                return Err(PriceError::PriceNotFound {
                    symbol: canonical(symbol),
                    currency: canonical(currency),
                });
            }
            return Err(PriceError::ProviderUnavailable {
                provider: self.name().to_string(),
                message: format!("Kraken API error: {:?}", response.error),
            });
        }

        // The result is keyed by Kraken's own pair name, which differs from
        // the requested one (XBTUSD -> XXBTZUSD), so take the single entry.
        let ticker = response.result.into_values().next().ok_or_else(|| {
            PriceError::PriceNotFound {
                symbol: canonical(symbol),
                currency: canonical(currency),
            }
        })?;
        let last = ticker.c.first().ok_or_else(|| {
            PriceError::InvalidPriceData("No last trade price received from Kraken".to_string())
        })?;

        let price = parse_price(self.name(), last)?;
        Ok(Quote::new(symbol, currency, price).with_source(self.name()))
    }
}

// REST ticker client
use crate::error::{PriceError, Result};
use crate::models::{canonical, Quote};
use crate::providers::{check_status, http_client, parse_price, stablecoin_quote, PriceProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const TICKER_PATH: &str = "/api/v3/ticker/price";
// Binance error code for an unknown trading pair.
const INVALID_SYMBOL: i64 = -1121;

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

pub struct BinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(&crate::config::get_binance_url())
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client("Binance")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn pair(symbol: &str, currency: &str) -> String {
        format!("{}{}", canonical(symbol), stablecoin_quote(currency))
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        let pair = Self::pair(symbol, currency);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, TICKER_PATH))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let error: BinanceError = response.json().await?;
            if error.code == INVALID_SYMBOL {
                return Err(PriceError::PriceNotFound {
                    symbol: canonical(symbol),
                    currency: canonical(currency),
                });
            }
            return Err(PriceError::ProviderUnavailable {
                provider: self.name().to_string(),
                message: error.msg,
            });
        }

        let ticker: BinanceTicker = check_status(self.name(), response)?.json().await?;
        let price = parse_price(self.name(), &ticker.price)?;
        Ok(Quote::new(symbol, currency, price).with_source(self.name()))
    }

    // The unfiltered ticker endpoint returns every pair in one response.
    async fn fetch_prices(&self, symbols: &[String], currency: &str) -> Result<Vec<Quote>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, TICKER_PATH))
            .send()
            .await?;
        let tickers: Vec<BinanceTicker> = check_status(self.name(), response)?.json().await?;
        let by_pair: HashMap<String, String> = tickers
            .into_iter()
            .map(|ticker| (ticker.symbol, ticker.price))
            .collect();

        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let raw = by_pair.get(&Self::pair(symbol, currency))?;
                let price = parse_price(self.name(), raw).ok()?;
                Some(Quote::new(symbol, currency, price).with_source(self.name()))
            })
            .collect())
    }
}

// REST ticker client
use crate::error::{PriceError, Result};
use crate::models::{canonical, Quote};
use crate::providers::{check_status, http_client, stablecoin_quote, validate_price, PriceProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const MERGED_PATH: &str = "/market/detail/merged";
const TICKERS_PATH: &str = "/market/tickers";

#[derive(Debug, Deserialize)]
struct HuobiTick {
    close: f64,
}

#[derive(Debug, Deserialize)]
struct HuobiTicker {
    symbol: String,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct HuobiResponse<T> {
    status: String,
    #[serde(rename = "err-code")]
    err_code: Option<String>,
    #[serde(rename = "err-msg")]
    err_msg: Option<String>,
    tick: Option<T>,
    data: Option<Vec<HuobiTicker>>,
}

pub struct HuobiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HuobiProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(&crate::config::get_huobi_url())
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client("Huobi")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    // Huobi pair names are lowercase, e.g. "btcusdt"
    fn pair(symbol: &str, currency: &str) -> String {
        format!("{}{}", canonical(symbol), stablecoin_quote(currency)).to_ascii_lowercase()
    }

    fn api_error<T>(&self, response: &HuobiResponse<T>, symbol: &str, currency: &str) -> PriceError {
        let code = response.err_code.as_deref().unwrap_or_default();
        if code.contains("limit") {
            return PriceError::Throttled(self.name().to_string());
        }
        if code == "invalid-parameter" {
            return PriceError::PriceNotFound {
                symbol: canonical(symbol),
                currency: canonical(currency),
            };
        }
        PriceError::ProviderUnavailable {
            provider: self.name().to_string(),
            message: format!(
                "status = {}, error = {:?}",
                response.status, response.err_msg
            ),
        }
    }
}

#[async_trait]
impl PriceProvider for HuobiProvider {
    fn name(&self) -> &'static str {
        "Huobi"
    }

    async fn fetch_price(&self, symbol: &str, currency: &str) -> Result<Quote> {
        let pair = Self::pair(symbol, currency);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, MERGED_PATH))
            .query(&[("symbol", pair.as_str())])
            .send()
            .await?;
        let response: HuobiResponse<HuobiTick> =
            check_status(self.name(), response)?.json().await?;

        if response.status != "ok" {
            return Err(self.api_error(&response, symbol, currency));
        }

        let tick = response.tick.ok_or_else(|| {
            PriceError::InvalidPriceData("No ticker data received from Huobi".to_string())
        })?;
        let price = validate_price(self.name(), tick.close)?;
        Ok(Quote::new(symbol, currency, price).with_source(self.name()))
    }

    async fn fetch_prices(&self, symbols: &[String], currency: &str) -> Result<Vec<Quote>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, TICKERS_PATH))
            .send()
            .await?;
        let response: HuobiResponse<HuobiTick> =
            check_status(self.name(), response)?.json().await?;

        if response.status != "ok" {
            return Err(self.api_error(&response, "*", currency));
        }

        let by_pair: HashMap<String, f64> = response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|ticker| (ticker.symbol, ticker.close))
            .collect();

        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let close = *by_pair.get(&Self::pair(symbol, currency))?;
                let price = validate_price(self.name(), close).ok()?;
                Some(Quote::new(symbol, currency, price).with_source(self.name()))
            })
            .collect())
    }
}

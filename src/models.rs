// Quote, ConversionRequest
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const USD: &str = "USD";

/// A single price observation for a symbol, quoted in `currency`.
///
/// `symbol` and `currency` are always stored as canonical uppercase tickers,
/// whatever case the caller used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub currency: String,
    pub price: f64,
    #[serde(with = "timestamp_serde")]
    pub observed_at: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Quote {
    pub fn new(symbol: &str, currency: &str, price: f64) -> Self {
        Self {
            symbol: canonical(symbol),
            currency: canonical(currency),
            price,
            observed_at: SystemTime::now(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_observed_at(mut self, observed_at: SystemTime) -> Self {
        self.observed_at = observed_at;
        self
    }
}

/// Arguments of a currency conversion. `amount` defaults to one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub from: String,
    pub to: String,
    #[serde(default = "default_amount")]
    pub amount: f64,
}

impl ConversionRequest {
    pub fn new(from: &str, to: &str, amount: f64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }
}

fn default_amount() -> f64 {
    1.0
}

/// Uppercases and trims a ticker or currency code.
pub fn canonical(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

mod timestamp_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let timestamp = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| serde::ser::Error::custom("Invalid timestamp"))?
            .as_secs_f64();
        serializer.serialize_f64(timestamp)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let timestamp = f64::deserialize(deserializer)?;
        let duration =
            std::time::Duration::try_from_secs_f64(timestamp).map_err(serde::de::Error::custom)?;
        UNIX_EPOCH
            .checked_add(duration)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

//! REST client for HashKey market data
//!
//! Klines for VWAP and the 24-hour ticker, used by the `/vwap` command.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

/// One candlestick
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Kline {
    /// Typical price: (high + low + close) / 3; None on overflow
    pub fn typical_price(&self) -> Option<Decimal> {
        self.high
            .checked_add(self.low)?
            .checked_add(self.close)?
            .checked_div(Decimal::from(3))
    }

    /// Build from the exchange's positional array `[t, o, h, l, c, v, ...]`
    fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() < 6 {
            return Err(RelayError::RestApi(format!(
                "Kline row has {} fields, expected at least 6",
                row.len()
            )));
        }

        let open_time = row[0]
            .as_u64()
            .ok_or_else(|| RelayError::RestApi("Kline open time is not an integer".to_string()))?;

        Ok(Self {
            open_time,
            open: decimal_field(&row[1])?,
            high: decimal_field(&row[2])?,
            low: decimal_field(&row[3])?,
            close: decimal_field(&row[4])?,
            volume: decimal_field(&row[5])?,
        })
    }
}

/// 24-hour rolling ticker
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ticker24h {
    #[serde(rename = "t")]
    pub timestamp: u64,

    #[serde(rename = "c", deserialize_with = "deserialize_decimal")]
    pub last: Decimal,

    #[serde(rename = "h", deserialize_with = "deserialize_decimal")]
    pub high: Decimal,

    #[serde(rename = "l", deserialize_with = "deserialize_decimal")]
    pub low: Decimal,

    #[serde(rename = "o", deserialize_with = "deserialize_decimal")]
    pub open: Decimal,

    #[serde(rename = "b", deserialize_with = "deserialize_decimal")]
    pub bid: Decimal,

    #[serde(rename = "a", deserialize_with = "deserialize_decimal")]
    pub ask: Decimal,

    #[serde(rename = "v", deserialize_with = "deserialize_decimal")]
    pub base_volume: Decimal,

    #[serde(rename = "qv", deserialize_with = "deserialize_decimal")]
    pub quote_volume: Decimal,
}

/// Volume-weighted average of typical prices; zero when there is no volume
pub fn vwap(klines: &[Kline]) -> Result<Decimal> {
    let overflow = || RelayError::RestApi("VWAP overflowed".to_string());

    let mut weighted = Decimal::ZERO;
    let mut volume = Decimal::ZERO;
    for k in klines {
        let notional = k
            .typical_price()
            .and_then(|price| price.checked_mul(k.volume))
            .ok_or_else(overflow)?;
        weighted = weighted.checked_add(notional).ok_or_else(overflow)?;
        volume = volume.checked_add(k.volume).ok_or_else(overflow)?;
    }

    if volume > Decimal::ZERO {
        weighted.checked_div(volume).ok_or_else(overflow)
    } else {
        Ok(Decimal::ZERO)
    }
}

/// Market data needed by the chat commands
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_vwap(&self, symbol: &str, interval: &str, limit: u32) -> Result<Decimal>;
    async fn get_24hr_ticker(&self, symbol: &str) -> Result<Ticker24h>;
}

/// HTTP client for the HashKey REST API
#[derive(Debug, Clone)]
pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarketClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch candlesticks
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let url = format!("{}/quote/v1/klines", self.base_url);
        info!(symbol = %symbol, interval = %interval, limit, "Fetching klines");

        let limit = limit.to_string();
        let rows = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Vec<Value>>>()
            .await?;

        rows.iter().map(|row| Kline::from_row(row)).collect()
    }
}

#[async_trait]
impl MarketDataSource for MarketClient {
    async fn get_vwap(&self, symbol: &str, interval: &str, limit: u32) -> Result<Decimal> {
        let klines = self.get_klines(symbol, interval, limit).await?;
        let value = vwap(&klines)?;
        debug!(symbol = %symbol, interval = %interval, klines = klines.len(), vwap = %value, "VWAP computed");
        Ok(value)
    }

    async fn get_24hr_ticker(&self, symbol: &str) -> Result<Ticker24h> {
        let url = format!("{}/quote/v1/ticker/24hr", self.base_url);
        info!(symbol = %symbol, "Fetching 24h ticker");

        let tickers = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Ticker24h>>()
            .await?;

        tickers
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::RestApi(format!("No 24h ticker returned for {}", symbol)))
    }
}

fn decimal_field(value: &Value) -> Result<Decimal> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RelayError::RestApi(format!("Invalid decimal field: {}", value)))
}

fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal_field(&value).map_err(serde::de::Error::custom)
}

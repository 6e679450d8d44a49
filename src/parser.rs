//! Parser module for HashKey streaming frames
//!
//! Classifies inbound frames into heartbeat acknowledgements, BBO data and
//! everything else, and builds the outbound subscribe/unsubscribe/ping frames.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::cache::BboSnapshot;
use crate::error::{RelayError, Result};

/// Topic name for best-bid/offer streams
pub const BBO_TOPIC: &str = "bbo";

/// Payload of a BBO data frame
#[derive(Debug, Clone, Deserialize)]
pub struct BboData {
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// Best bid price
    #[serde(rename = "b", deserialize_with = "deserialize_decimal")]
    pub bid_price: Decimal,

    /// Best bid quantity
    #[serde(rename = "bz", deserialize_with = "deserialize_decimal")]
    pub bid_quantity: Decimal,

    /// Best ask price
    #[serde(rename = "a", deserialize_with = "deserialize_decimal")]
    pub ask_price: Decimal,

    /// Best ask quantity
    #[serde(rename = "az", deserialize_with = "deserialize_decimal")]
    pub ask_quantity: Decimal,

    /// Exchange timestamp (milliseconds)
    #[serde(rename = "t")]
    pub timestamp: u64,
}

impl TryFrom<BboData> for BboSnapshot {
    type Error = RelayError;

    fn try_from(data: BboData) -> Result<Self> {
        if data.symbol.trim().is_empty() {
            return Err(RelayError::Parse("BBO frame has an empty symbol".to_string()));
        }

        Ok(BboSnapshot {
            symbol: data.symbol,
            bid_price: data.bid_price,
            bid_quantity: data.bid_quantity,
            ask_price: data.ask_price,
            ask_quantity: data.ask_quantity,
            timestamp: data.timestamp,
        })
    }
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server reply to one of our pings
    Heartbeat { pong: Option<u64> },
    /// BBO update for the subscribed topic
    Data(BboSnapshot),
    /// Subscription acks, errors and anything we don't consume
    Unknown(String),
}

impl InboundFrame {
    /// Parse a raw text frame
    ///
    /// Frames that are not JSON, or BBO frames missing a required field,
    /// fail with `RelayError::Parse`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;

        let Some(object) = value.as_object_mut() else {
            return Ok(InboundFrame::Unknown(raw.to_string()));
        };

        if let Some(pong) = object.get("pong") {
            return Ok(InboundFrame::Heartbeat {
                pong: pong.as_u64(),
            });
        }

        let is_bbo = object.get("topic").and_then(Value::as_str) == Some(BBO_TOPIC);
        if is_bbo {
            if let Some(data) = object.remove("data") {
                let data: BboData = serde_json::from_value(data)?;
                return Ok(InboundFrame::Data(data.try_into()?));
            }
        }

        Ok(InboundFrame::Unknown(raw.to_string()))
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Heartbeat { .. } => "heartbeat",
            InboundFrame::Data(_) => "data",
            InboundFrame::Unknown(_) => "unknown",
        }
    }
}

/// Subscription event carried by subscribe/unsubscribe frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionEvent {
    Sub,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolParams {
    pub symbol: String,
}

/// Frames we write to the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Subscription {
        topic: String,
        event: SubscriptionEvent,
        params: SymbolParams,
    },
    Ping {
        ping: u64,
    },
}

impl OutboundFrame {
    pub fn subscribe(symbol: &str) -> Self {
        Self::subscription(symbol, SubscriptionEvent::Sub)
    }

    pub fn unsubscribe(symbol: &str) -> Self {
        Self::subscription(symbol, SubscriptionEvent::Cancel)
    }

    pub fn ping(timestamp_ms: u64) -> Self {
        OutboundFrame::Ping { ping: timestamp_ms }
    }

    fn subscription(symbol: &str, event: SubscriptionEvent) -> Self {
        OutboundFrame::Subscription {
            topic: BBO_TOPIC.to_string(),
            event,
            params: SymbolParams {
                symbol: symbol.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Custom deserializer for Decimal from a JSON string or number
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    let text = match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    };

    Decimal::from_str(text.trim())
        .or_else(|_| Decimal::from_scientific(text.trim()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_bbo_data() {
        let raw = r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"3000.5","bz":"1.2","a":"3001.0","az":"0.8","t":1700000000000}}"#;

        let frame = InboundFrame::parse(raw).unwrap();
        if let InboundFrame::Data(bbo) = frame {
            assert_eq!(bbo.symbol, "ETHUSDT");
            assert_eq!(bbo.bid_price, dec!(3000.5));
            assert_eq!(bbo.bid_quantity, dec!(1.2));
            assert_eq!(bbo.ask_price, dec!(3001.0));
            assert_eq!(bbo.ask_quantity, dec!(0.8));
            assert_eq!(bbo.timestamp, 1_700_000_000_000);
        } else {
            panic!("Expected Data");
        }
    }

    #[test]
    fn test_parse_numeric_prices() {
        let raw = r#"{"topic":"bbo","symbol":"BTCUSDT","data":{"s":"BTCUSDT","b":64000,"bz":0.25,"a":64000.5,"az":1,"t":1}}"#;

        match InboundFrame::parse(raw).unwrap() {
            InboundFrame::Data(bbo) => {
                assert_eq!(bbo.bid_price, dec!(64000));
                assert_eq!(bbo.bid_quantity, dec!(0.25));
                assert_eq!(bbo.ask_price, dec!(64000.5));
            }
            other => panic!("Expected Data, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pong() {
        let frame = InboundFrame::parse(r#"{"pong":1700000000123}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Heartbeat {
                pong: Some(1_700_000_000_123)
            }
        );
        assert_eq!(frame.kind(), "heartbeat");
    }

    #[test]
    fn test_parse_subscription_ack_is_unknown() {
        let raw = r#"{"topic":"bbo","event":"sub","params":{"symbol":"ETHUSDT"},"code":"0","msg":"Success"}"#;
        assert!(matches!(InboundFrame::parse(raw).unwrap(), InboundFrame::Unknown(_)));
    }

    #[test]
    fn test_parse_other_topic_is_unknown() {
        let raw = r#"{"topic":"trade","data":{"s":"ETHUSDT"}}"#;
        assert!(matches!(InboundFrame::parse(raw).unwrap(), InboundFrame::Unknown(_)));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let raw = r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"3000.5","bz":"1.2","a":"3001.0","t":1}}"#;
        assert!(matches!(InboundFrame::parse(raw), Err(RelayError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_bad_decimal_and_garbage() {
        let raw = r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"abc","bz":"1.2","a":"3001.0","az":"1","t":1}}"#;
        assert!(InboundFrame::parse(raw).is_err());
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse(r#"{"topic":"bbo","data":{"s":"","b":"1","bz":"1","a":"1","az":"1","t":1}}"#).is_err());
    }

    #[test]
    fn test_outbound_frames() {
        assert_eq!(
            OutboundFrame::subscribe("ETHUSDT").to_json().unwrap(),
            r#"{"topic":"bbo","event":"sub","params":{"symbol":"ETHUSDT"}}"#
        );
        assert_eq!(
            OutboundFrame::unsubscribe("ETHUSDT").to_json().unwrap(),
            r#"{"topic":"bbo","event":"cancel","params":{"symbol":"ETHUSDT"}}"#
        );
        assert_eq!(OutboundFrame::ping(42).to_json().unwrap(), r#"{"ping":42}"#);
    }
}

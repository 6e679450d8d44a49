//! BBO Relay
//!
//! Streams best bid/offer data from the HashKey WebSocket API into an
//! in-memory cache, keeps the connection alive with heartbeats and
//! reconnects, and relays the cached state to Telegram subscribers.

pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod notifier;
pub mod parser;
pub mod rest;
pub mod subscribers;
pub mod websocket;

pub use cache::{BboCache, BboSnapshot};
pub use config::Config;
pub use error::{RelayError, Result};
pub use metrics::Metrics;
pub use notifier::{MessageSender, NotificationLoop};
pub use parser::{InboundFrame, OutboundFrame};
pub use rest::{MarketClient, MarketDataSource};
pub use subscribers::{ChatId, JsonFileStore, SubscriberRegistry};
pub use websocket::{ConnectionState, StreamConfig, StreamSupervisor};

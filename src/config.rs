//! Configuration module for the BBO relay

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::error::RelayError;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Symbols to subscribe to on the BBO topic (e.g., ["ETHUSDT"])
    pub symbols: Vec<String>,

    /// Streaming endpoint for HashKey quotes
    pub ws_endpoint: String,

    /// REST API endpoint for klines and tickers
    pub rest_endpoint: String,

    /// Telegram bot token
    pub telegram_bot_token: String,

    /// Telegram Bot API base URL
    pub telegram_api_base: String,

    /// File holding the persisted subscriber list
    pub subscribers_path: String,

    /// Symbol used by `/vwap` when none is given
    pub default_symbol: String,

    /// Heartbeat and handshake settings
    pub heartbeat_interval_ms: u64,
    pub connect_timeout_ms: u64,

    /// A connection with no inbound frame for this long is torn down
    pub stale_timeout_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub reconnect_backoff_multiplier: u32,

    /// Interval between subscriber notifications
    pub notify_interval_secs: u64,

    /// Long-poll timeout for Telegram updates
    pub poll_timeout_secs: u64,

    /// Port for the health check server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| defaults.symbols.join(","))
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        if symbols.is_empty() {
            return Err(RelayError::Config("SYMBOLS must name at least one symbol".to_string()).into());
        }

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| RelayError::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

        Ok(Self {
            symbols,
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            rest_endpoint: env::var("REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            telegram_bot_token,
            telegram_api_base: env::var("TELEGRAM_API_BASE").unwrap_or(defaults.telegram_api_base),
            subscribers_path: env::var("SUBSCRIBERS_PATH").unwrap_or(defaults.subscribers_path),
            default_symbol: env::var("DEFAULT_SYMBOL")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.default_symbol),
            heartbeat_interval_ms: env_or("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            connect_timeout_ms: env_or("CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            stale_timeout_ms: env_or("STALE_TIMEOUT_MS", defaults.stale_timeout_ms),
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            max_reconnect_delay_ms: env_or("MAX_RECONNECT_DELAY_MS", defaults.max_reconnect_delay_ms),
            reconnect_backoff_multiplier: env_or(
                "RECONNECT_BACKOFF_MULTIPLIER",
                defaults.reconnect_backoff_multiplier,
            ),
            notify_interval_secs: env_or("NOTIFY_INTERVAL_SECS", defaults.notify_interval_secs),
            poll_timeout_secs: env_or("POLL_TIMEOUT_SECS", defaults.poll_timeout_secs),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["ETHUSDT".to_string()],
            ws_endpoint: "wss://stream-pro.hashkey.com/quote/ws/v2".to_string(),
            rest_endpoint: "https://api-pro.hashkey.com".to_string(),
            telegram_bot_token: String::new(),
            telegram_api_base: "https://api.telegram.org".to_string(),
            subscribers_path: "subscribers.json".to_string(),
            default_symbol: "BTCUSD".to_string(),
            heartbeat_interval_ms: 5_000,
            connect_timeout_ms: 10_000,
            stale_timeout_ms: 45_000,
            reconnect_delay_ms: 5_000,
            max_reconnect_delay_ms: 60_000,
            reconnect_backoff_multiplier: 2,
            notify_interval_secs: 10,
            poll_timeout_secs: 30,
            health_port: 9090,
        }
    }
}

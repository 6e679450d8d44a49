//! BBO Relay - HashKey best bid/offer stream relayed to Telegram

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bbo_relay::bot::{build_bot, BotService, CommandHandler};
use bbo_relay::health::{self, HealthState};
use bbo_relay::{
    BboCache, Config, JsonFileStore, MarketClient, Metrics, NotificationLoop, StreamConfig,
    StreamSupervisor, SubscriberRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting BBO relay");

    let config = Config::load()?;
    info!(symbols = ?config.symbols, endpoint = %config.ws_endpoint, "Configuration loaded");

    let metrics = Arc::new(Metrics::new()?);
    let cache = Arc::new(BboCache::new());
    let registry = Arc::new(SubscriberRegistry::load(JsonFileStore::new(&config.subscribers_path)).await);
    let bot = build_bot(&config.telegram_api_base, &config.telegram_bot_token)?;
    let market = Arc::new(MarketClient::new(&config.rest_endpoint)?);

    let supervisor = StreamSupervisor::new(StreamConfig::from_config(&config), cache.clone(), metrics.clone());
    supervisor.start().await?;

    let shutdown = CancellationToken::new();

    let notifier = NotificationLoop::new(
        cache.clone(),
        registry.clone(),
        Arc::new(bot.clone()),
        metrics.clone(),
        Duration::from_secs(config.notify_interval_secs),
    );
    let notifier_task = tokio::spawn(notifier.run(shutdown.clone()));

    let handler = CommandHandler::new(
        cache.clone(),
        registry.clone(),
        market,
        config.symbols.first().cloned().unwrap_or_else(|| config.default_symbol.clone()),
        config.default_symbol.clone(),
    );
    let bot_service = BotService::new(bot, handler, Duration::from_secs(config.poll_timeout_secs));
    let bot_task = tokio::spawn(bot_service.run(shutdown.clone()));

    let health_state = HealthState {
        connection: supervisor.subscribe_state(),
        cache,
        registry,
        metrics,
    };
    let health_task = tokio::spawn(health::serve(health_state, config.health_port, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = notifier_task.await {
        error!(error = %e, "Notification loop task failed");
    }
    if let Err(e) = bot_task.await {
        error!(error = %e, "Telegram dispatcher task failed");
    }

    supervisor.stop().await;

    match health_task.await {
        Ok(Err(e)) => warn!(error = %e, "Health server error"),
        Err(e) => error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    info!("BBO relay stopped");
    Ok(())
}

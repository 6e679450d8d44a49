//! Chat commands and their replies

use std::sync::Arc;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use tracing::{error, info};

use super::report::VwapReport;
use super::telegram::menu;
use crate::cache::BboCache;
use crate::notifier::format_snapshot;
use crate::rest::MarketDataSource;
use crate::subscribers::{ChatId, SubscriberRegistry};

/// Bot commands; symbol arguments are optional
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "receive best bid/offer updates")]
    Start,

    #[command(description = "stop receiving updates")]
    Stop,

    #[command(description = "latest best bid/offer: /latest [SYMBOL]")]
    Latest(String),

    #[command(description = "VWAP and 24h prices: /vwap [SYMBOL]")]
    Vwap(String),

    #[command(description = "show this message")]
    Help,
}

/// Reply produced by a command
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Reply for a slash command the bot does not know
pub fn unknown_command(text: &str) -> Reply {
    let name = text.split_whitespace().next().unwrap_or(text);
    Reply::text(format!(
        "Unknown command {}.\n\n{}",
        escape(name),
        Command::descriptions()
    ))
}

fn symbol_arg(arg: &str) -> Option<String> {
    arg.split_whitespace().next().map(str::to_uppercase)
}

/// Executes commands against the cache, registry and REST source
pub struct CommandHandler {
    cache: Arc<BboCache>,
    registry: Arc<SubscriberRegistry>,
    market: Arc<dyn MarketDataSource>,
    stream_symbol: String,
    vwap_symbol: String,
}

impl CommandHandler {
    pub fn new(
        cache: Arc<BboCache>,
        registry: Arc<SubscriberRegistry>,
        market: Arc<dyn MarketDataSource>,
        stream_symbol: String,
        vwap_symbol: String,
    ) -> Self {
        Self {
            cache,
            registry,
            market,
            stream_symbol,
            vwap_symbol,
        }
    }

    pub async fn handle(&self, chat_id: ChatId, command: Command) -> Reply {
        info!(chat_id, command = ?command, "Handling command");

        match command {
            Command::Start => {
                let added = self.registry.subscribe(chat_id).await;
                let status = if added {
                    "You are now subscribed to best bid/offer updates."
                } else {
                    "You are already subscribed."
                };
                Reply {
                    text: format!("Welcome to the bot!\n{}", status),
                    keyboard: Some(menu()),
                }
            }
            Command::Stop => {
                if self.registry.unsubscribe(chat_id).await {
                    Reply::text("You will no longer receive updates. Send /start to resubscribe.")
                } else {
                    Reply::text("You were not subscribed.")
                }
            }
            Command::Help => Reply::text(Command::descriptions().to_string()),
            Command::Latest(arg) => {
                let symbol = symbol_arg(&arg).unwrap_or_else(|| self.stream_symbol.clone());
                match self.cache.get(&symbol) {
                    Some(bbo) => Reply::text(format_snapshot(&bbo)),
                    None => Reply::text(format!(
                        "No best bid/offer received yet for {}.",
                        escape(&symbol)
                    )),
                }
            }
            Command::Vwap(arg) => {
                let symbol = symbol_arg(&arg).unwrap_or_else(|| self.vwap_symbol.clone());
                match VwapReport::fetch(self.market.as_ref(), &symbol).await {
                    Ok(report) => Reply::text(report.render()),
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "VWAP request failed");
                        Reply::text(format!(
                            "Error fetching VWAP or market data: {}",
                            escape(&e.to_string())
                        ))
                    }
                }
            }
        }
    }
}

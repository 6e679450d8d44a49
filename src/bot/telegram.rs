//! Telegram delivery over teloxide

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

use crate::error::{RelayError, Result};
use crate::notifier::MessageSender;
use crate::subscribers::ChatId;

/// Build a bot client, optionally against a self-hosted Bot API server
pub fn build_bot(api_base: &str, token: &str) -> Result<Bot> {
    let url = reqwest::Url::parse(api_base)
        .map_err(|e| RelayError::Config(format!("Invalid TELEGRAM_API_BASE {}: {}", api_base, e)))?;
    Ok(Bot::new(token).set_api_url(url))
}

/// Buttons attached to the welcome message
pub fn menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Latest BBO", "/latest"),
        InlineKeyboardButton::callback("VWAP", "/vwap"),
        InlineKeyboardButton::callback("Stop", "/stop"),
    ]])
}

/// Send an HTML message, optionally with inline buttons
pub async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> ResponseResult<()> {
    let request = bot
        .send_message(teloxide::types::ChatId(chat_id), text)
        .parse_mode(ParseMode::Html);

    match keyboard {
        Some(keyboard) => request.reply_markup(keyboard).await?,
        None => request.await?,
    };
    Ok(())
}

#[async_trait]
impl MessageSender for Bot {
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()> {
        send_html(self, recipient, text.to_string(), None)
            .await
            .map_err(|e| RelayError::Delivery {
                recipient,
                reason: e.to_string(),
            })
    }
}

//! Telegram front end
//!
//! Dispatches commands and button presses to the command handler, which
//! answers from the cache, the subscriber registry and the REST API.

mod commands;
mod report;
mod telegram;

pub use commands::{unknown_command, Command, CommandHandler, Reply};
pub use report::{group_thousands, position_bar, position_in_range, VwapReport};
pub use telegram::{build_bot, menu, send_html};

use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Long-polling dispatcher bound to a cancellation token
pub struct BotService {
    bot: Bot,
    handler: Arc<CommandHandler>,
    poll_timeout: Duration,
}

impl BotService {
    pub fn new(bot: Bot, handler: CommandHandler, poll_timeout: Duration) -> Self {
        Self {
            bot,
            handler: Arc::new(handler),
            poll_timeout,
        }
    }

    /// Dispatch updates until `cancel` fires; in-flight handlers finish first
    pub async fn run(self, cancel: CancellationToken) {
        info!(poll_timeout_secs = self.poll_timeout.as_secs(), "Starting Telegram dispatcher");

        let schema = dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(on_command),
            )
            .branch(Update::filter_message().endpoint(on_other_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), schema)
            .dependencies(dptree::deps![self.handler.clone()])
            .build();

        let token = dispatcher.shutdown_token();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            // shutdown() fails while the dispatcher is still starting up
            loop {
                match token.shutdown() {
                    Ok(done) => {
                        done.await;
                        break;
                    }
                    Err(_) => sleep(Duration::from_millis(50)).await,
                }
            }
        });

        let listener = Polling::builder(self.bot).timeout(self.poll_timeout).build();
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("Telegram polling failed"),
            )
            .await;

        watcher.abort();
        info!("Telegram dispatcher stopped");
    }
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    handler: Arc<CommandHandler>,
) -> ResponseResult<()> {
    let reply = handler.handle(msg.chat.id.0, cmd).await;
    send_html(&bot, msg.chat.id.0, reply.text, reply.keyboard).await
}

async fn on_other_message(bot: Bot, msg: Message) -> ResponseResult<()> {
    match msg.text() {
        Some(text) if text.starts_with('/') => {
            let reply = unknown_command(text);
            send_html(&bot, msg.chat.id.0, reply.text, None).await
        }
        _ => {
            debug!(chat_id = msg.chat.id.0, "Ignoring non-command message");
            Ok(())
        }
    }
}

async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    me: Me,
    handler: Arc<CommandHandler>,
) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id.0) else {
        debug!("Callback without a message, ignoring");
        return Ok(());
    };

    match callback_command(q.data.as_deref(), me.username()) {
        Some(cmd) => {
            let reply = handler.handle(chat_id, cmd).await;
            send_html(&bot, chat_id, reply.text, reply.keyboard).await
        }
        None => {
            warn!(chat_id, data = ?q.data, "Unrecognised callback data");
            Ok(())
        }
    }
}

/// Button callbacks carry a command string such as `/latest`
pub fn callback_command(data: Option<&str>, bot_name: &str) -> Option<Command> {
    Command::parse(data?, bot_name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_command() {
        assert_eq!(
            callback_command(Some("/latest"), "hashkey_bbo_bot"),
            Some(Command::Latest(String::new()))
        );
        assert_eq!(callback_command(Some("/stop"), "hashkey_bbo_bot"), Some(Command::Stop));
        assert_eq!(callback_command(Some("main_menu"), "hashkey_bbo_bot"), None);
        assert_eq!(callback_command(None, "hashkey_bbo_bot"), None);
    }

    #[test]
    fn test_menu_buttons_route_to_commands() {
        use teloxide::types::InlineKeyboardButtonKind;

        for button in &menu().inline_keyboard[0] {
            let InlineKeyboardButtonKind::CallbackData(data) = &button.kind else {
                panic!("menu button without callback data");
            };
            assert!(callback_command(Some(data), "hashkey_bbo_bot").is_some());
        }
    }
}

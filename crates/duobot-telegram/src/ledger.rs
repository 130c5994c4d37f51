//! Ledger bot: bookkeeping through chat messages

use std::sync::Arc;

use teloxide::{prelude::*, types::BotCommand};
use tracing::{debug, info, warn};

use duobot_core::{Clock, LedgerConfig};
use duobot_ledger::{Ledger, LedgerCommand};

use crate::common::{is_allowed, require_token, send_text, sender_id};
use crate::error::Result;

const UNAUTHORIZED: &str = "您没有权限使用此机器人。";

/// State shared by all handlers
pub struct LedgerState {
    pub ledger: Arc<Ledger>,
    pub allowed_user_ids: Vec<i64>,
}

/// Telegram ledger bot
pub struct LedgerBot {
    bot: Bot,
    state: Arc<LedgerState>,
}

impl LedgerBot {
    pub fn new(token: Option<&str>, ledger: Arc<Ledger>, allowed_user_ids: Vec<i64>) -> Result<Self> {
        let token = require_token(token)?;
        Ok(Self {
            bot: Bot::new(token),
            state: Arc::new(LedgerState {
                ledger,
                allowed_user_ids,
            }),
        })
    }

    /// Open the configured ledger database and create the bot
    pub fn from_config(
        token: Option<&str>,
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
        allowed_user_ids: Vec<i64>,
    ) -> Result<Self> {
        let token = require_token(token)?;
        let ledger = Arc::new(Ledger::from_config(config, clock)?);
        Self::new(Some(token), ledger, allowed_user_ids)
    }

    /// Poll for updates until the task is aborted
    pub async fn start(self) -> Result<()> {
        info!("Starting ledger bot...");

        if let Err(e) = self.bot.set_my_commands(menu_commands()).await {
            warn!("Failed to register ledger bot commands: {}", e);
        }

        let handler = Update::filter_message().endpoint(
            |bot: Bot, msg: Message, state: Arc<LedgerState>| async move {
                handle_message(bot, msg, state).await
            },
        );

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.state])
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

/// Commands shown in the Telegram menu; the rest are plain-text keywords
fn menu_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("help", "显示帮助"),
        BotCommand::new("add", "记录入款，例如 /add 100"),
        BotCommand::new("sub", "记录出款，例如 /sub 100"),
        BotCommand::new("bill", "查看账单"),
        BotCommand::new("summary", "查看汇总"),
        BotCommand::new("calc", "计算数学表达式"),
    ]
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<LedgerState>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user_id) = sender_id(&msg) else {
        debug!("Ignoring message without a sender in chat {}", msg.chat.id.0);
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if !is_allowed(&state.allowed_user_ids, user_id) {
        // stay silent on chatter that is not addressed to the bot
        if !matches!(LedgerCommand::parse(text), Ok(None)) {
            info!(user_id, "Rejected ledger command from user not on the allow-list");
            bot.send_message(chat_id, UNAUTHORIZED).await?;
        }
        return Ok(());
    }

    let Some(reply) = ledger_reply(state.ledger.clone(), user_id, chat_id.0, text.to_string()).await? else {
        return Ok(());
    };

    debug!(user_id, chat_id = chat_id.0, "Ledger reply ready");
    send_text(&bot, chat_id, &reply).await
}

/// Run a ledger command off the async workers; SQLite calls block
async fn ledger_reply(
    ledger: Arc<Ledger>,
    user_id: i64,
    chat_id: i64,
    text: String,
) -> Result<Option<String>> {
    let reply = tokio::task::spawn_blocking(move || ledger.handle_text(user_id, chat_id, &text)).await?;
    Ok(reply)
}

//! Assistant bot: relays conversations to the LLM

use std::sync::Arc;

use teloxide::{prelude::*, types::ChatAction, utils::command::BotCommands};
use tracing::{debug, info, warn};

use duobot_core::SessionFacade;

use crate::common::{is_allowed, require_token, send_text, sender_id};
use crate::error::Result;

const UNAUTHORIZED: &str = "⚠️ You are not allowed to use this bot.";
const EMPTY_QUESTION: &str = "Please type a question. Usage: /ask <question>";
const UNKNOWN_COMMAND: &str = "Unknown command. Send /help to see what I can do.";

/// Assistant bot commands
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Assistant bot commands")]
enum Command {
    #[command(description = "Ask the assistant a question")]
    Ask(String),
    #[command(description = "Clear conversation history")]
    Clear,
    #[command(description = "Show help message")]
    Help,
    #[command(description = "Start the bot")]
    Start,
}

/// State shared by all handlers
pub struct AssistantState {
    pub facade: Arc<SessionFacade>,
    pub allowed_user_ids: Vec<i64>,
}

/// Session key of a participant: one conversation per user per chat
pub fn session_key(chat_id: i64, user_id: i64) -> String {
    format!("telegram:{}:{}", chat_id, user_id)
}

/// Telegram assistant bot
pub struct AssistantBot {
    bot: Bot,
    state: Arc<AssistantState>,
}

impl AssistantBot {
    pub fn new(token: Option<&str>, facade: Arc<SessionFacade>, allowed_user_ids: Vec<i64>) -> Result<Self> {
        let token = require_token(token)?;
        Ok(Self {
            bot: Bot::new(token),
            state: Arc::new(AssistantState {
                facade,
                allowed_user_ids,
            }),
        })
    }

    /// Poll for updates until the task is aborted
    pub async fn start(self) -> Result<()> {
        info!("Starting assistant bot...");

        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!("Failed to register assistant bot commands: {}", e);
        }

        let handler = Update::filter_message()
            .branch(dptree::entry().filter_command::<Command>().endpoint(
                |bot: Bot, msg: Message, cmd: Command, state: Arc<AssistantState>| async move {
                    match cmd {
                        Command::Ask(question) => handle_ask(bot, msg, state, question).await,
                        Command::Clear => handle_clear(bot, msg, state).await,
                        Command::Help | Command::Start => handle_help(bot, msg).await,
                    }
                },
            ))
            .branch(dptree::endpoint(
                |bot: Bot, msg: Message, state: Arc<AssistantState>| async move {
                    handle_text(bot, msg, state).await
                },
            ));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.state])
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

/// Sender id if the sender may use the bot; replies to everyone else
async fn authorize(bot: &Bot, msg: &Message, state: &AssistantState) -> Result<Option<i64>> {
    let Some(user_id) = sender_id(msg) else {
        debug!("Ignoring message without a sender in chat {}", msg.chat.id.0);
        return Ok(None);
    };

    if !is_allowed(&state.allowed_user_ids, user_id) {
        info!(user_id, "Rejected message from user not on the allow-list");
        bot.send_message(msg.chat.id, UNAUTHORIZED).await?;
        return Ok(None);
    }

    Ok(Some(user_id))
}

/// Handle /ask and plain text
async fn handle_ask(bot: Bot, msg: Message, state: Arc<AssistantState>, question: String) -> Result<()> {
    let Some(user_id) = authorize(&bot, &msg, &state).await? else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if question.trim().is_empty() {
        bot.send_message(chat_id, EMPTY_QUESTION).await?;
        return Ok(());
    }

    info!(user_id, chat_id = chat_id.0, "Processing question ({} chars)", question.chars().count());

    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!("Failed to send typing action: {}", e);
    }

    let key = session_key(chat_id.0, user_id);
    let reply = state.facade.handle_turn(&key, &question).await;
    send_text(&bot, chat_id, &reply).await
}

/// Plain messages are questions; unknown slash commands get a hint
async fn handle_text(bot: Bot, msg: Message, state: Arc<AssistantState>) -> Result<()> {
    let Some(text) = msg.text().map(str::to_string) else {
        return Ok(());
    };

    if text.starts_with('/') {
        if authorize(&bot, &msg, &state).await?.is_some() {
            bot.send_message(msg.chat.id, UNKNOWN_COMMAND).await?;
        }
        return Ok(());
    }

    handle_ask(bot, msg, state, text).await
}

/// Handle /clear
async fn handle_clear(bot: Bot, msg: Message, state: Arc<AssistantState>) -> Result<()> {
    let Some(user_id) = authorize(&bot, &msg, &state).await? else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let status = state.facade.clear_session(&session_key(chat_id.0, user_id));
    bot.send_message(chat_id, status.message()).await?;

    info!(user_id, chat_id = chat_id.0, "Clear requested: {:?}", status);
    Ok(())
}

fn help_text() -> String {
    format!(
        "🤖 duobot assistant\n\n\
         Send any message to chat with the assistant. Recent messages are \
         remembered until you clear them or stay quiet for a while.\n\n{}",
        Command::descriptions()
    )
}

/// Handle /help and /start
async fn handle_help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, help_text()).await?;
    Ok(())
}

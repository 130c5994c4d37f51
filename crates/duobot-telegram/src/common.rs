//! Helpers shared by both bots

use teloxide::prelude::*;

use crate::error::{Result, TelegramError};

/// Telegram's limit on the length of a single text message
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Empty allow-list means everyone may use the bot
pub fn is_allowed(allowed_user_ids: &[i64], user_id: i64) -> bool {
    allowed_user_ids.is_empty() || allowed_user_ids.contains(&user_id)
}

/// Telegram user id of the message author, if any
pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().and_then(|user| i64::try_from(user.id.0).ok())
}

/// Reject missing or blank tokens
pub fn require_token(token: Option<&str>) -> Result<&str> {
    match token.map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(TelegramError::TokenNotSet),
    }
}

/// Split text into chunks of at most `limit` characters, cutting on char
/// boundaries and preferring a newline in the second half of a chunk
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some((hard_end, _)) = rest.char_indices().nth(limit) {
        let window = &rest[..hard_end];
        let end = match window.rfind('\n') {
            Some(i) if window[..i].chars().count() >= limit / 2 => i + 1,
            _ => hard_end,
        };
        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Send `text`, split into as many messages as needed
pub async fn send_text(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for chunk in split_message(text, MAX_MESSAGE_CHARS) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert!(is_allowed(&[], 42));
        assert!(is_allowed(&[7, 42], 42));
        assert!(!is_allowed(&[7], 42));
    }

    #[test]
    fn test_require_token() {
        assert_eq!(require_token(Some(" abc ")).unwrap(), "abc");
        assert!(matches!(require_token(Some("  ")), Err(TelegramError::TokenNotSet)));
        assert!(matches!(require_token(None), Err(TelegramError::TokenNotSet)));
    }

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert_eq!(split_message("exactly10!", 10), vec!["exactly10!"]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "账".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(7), "b".repeat(7));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec![format!("{}\n", "a".repeat(7)), "b".repeat(7)]);
    }

    #[test]
    fn test_split_ignores_early_newlines() {
        let text = format!("a\n{}", "b".repeat(20));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks.concat(), text);
    }
}

//! LLM API wire types

use serde::{Deserialize, Serialize};

use crate::session::Turn;

/// Message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<MessageContent>,
}

impl Message {
    /// Create a user message with text
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![MessageContent::Text { text: text.into() }],
        }
    }

    /// Get text content from message
    pub fn text_content(&self) -> String {
        join_text(&self.content)
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role().as_api_role().to_string(),
            content: vec![MessageContent::Text {
                text: turn.content().to_string(),
            }],
        }
    }
}

/// Content block in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// Any block type this client does not use (tool calls, thinking, ...)
    #[serde(other)]
    Unsupported,
}

fn join_text(blocks: &[MessageContent]) -> String {
    blocks
        .iter()
        .filter_map(|c| match c {
            MessageContent::Text { text } => Some(text.as_str()),
            MessageContent::Unsupported => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Messages API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// Messages API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl MessagesResponse {
    /// Text blocks of the reply joined by newlines
    pub fn text(&self) -> String {
        join_text(&self.content)
    }
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ============================================================================
// OpenAI-compatible types
// ============================================================================

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.clone(),
            content: msg.text_content(),
        }
    }
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl ChatCompletionRequest {
    /// Convert from a Messages API request; the system prompt becomes the
    /// leading `system` message
    pub fn from_messages_request(req: &MessagesRequest) -> Self {
        let system = req.system.iter().map(|system| OpenAiMessage {
            role: "system".to_string(),
            content: system.clone(),
        });

        Self {
            model: req.model.clone(),
            messages: system.chain(req.messages.iter().map(OpenAiMessage::from)).collect(),
            max_tokens: Some(req.max_tokens),
        }
    }
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessageResponse,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChatCompletionResponse {
    /// Convert to a Messages API response
    pub fn into_messages_response(self) -> MessagesResponse {
        let choice = self.choices.into_iter().next();

        let content = choice
            .as_ref()
            .and_then(|c| c.message.content.clone())
            .filter(|text| !text.is_empty())
            .map(|text| vec![MessageContent::Text { text }])
            .unwrap_or_default();

        let stop_reason = choice.and_then(|c| c.finish_reason).map(|reason| match reason.as_str() {
            "stop" => "end_turn".to_string(),
            _ => reason,
        });

        MessagesResponse {
            id: self.id,
            role: "assistant".to_string(),
            content,
            model: self.model,
            stop_reason,
            usage: self.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        }
    }
}

/// Builder for creating messages requests
pub struct MessagesRequestBuilder {
    model: String,
    max_tokens: u64,
    system: Option<String>,
    messages: Vec<Message>,
}

impl MessagesRequestBuilder {
    pub fn new(model: String) -> Self {
        Self {
            model,
            max_tokens: 2048,
            system: None,
            messages: vec![],
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn build(self) -> MessagesRequest {
        MessagesRequest {
            model: self.model,
            max_tokens: self.max_tokens,
            system: self.system,
            messages: self.messages,
        }
    }
}
